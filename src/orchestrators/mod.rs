//! Orchestration strategies over the provider registry.
//!
//! | entry point              | strategy                      |
//! |--------------------------|-------------------------------|
//! | `resolve_isbn`           | cascade, confidence first     |
//! | `fetch_ratings`          | cascade, confidence first     |
//! | `detect_public_domain`   | cascade, confidence first     |
//! | `author_biography`       | cascade, confidence first     |
//! | `fetch_cover`            | cascade, free first           |
//! | `enrich_metadata`        | parallel aggregation + merge  |
//! | `aggregate_external_ids` | parallel aggregation + merge  |
//! | `edition_variants`       | parallel aggregation + union  |
//! | `generate_books`         | concurrent generation + dedup |
//!
//! Every entry point is total: provider failures are logged and absorbed,
//! and the caller gets a value or [`Lookup::NotFound`].

mod aggregate;
mod cascade;
mod generation;
mod merge;

use std::sync::Arc;

pub use aggregate::{gather, Gathered};
pub use cascade::{cascade, order_providers, PriorityConfig, PriorityPolicy};
pub use merge::{merge_editions, merge_external_ids, merge_metadata, union_case_insensitive};

use crate::dedup::{DedupConfig, Deduplicator};
use crate::models::{
    AuthorBiography, Capability, CoverResult, EditionVariant, GenerationOutcome,
    GenerationRequest, Lookup, MergedExternalIds, MergedMetadata, PublicDomainQuery,
    PublicDomainResult, RatingsResult, ResolutionQuery, ResolutionResult,
};
use crate::providers::{Provider, ProviderRegistry, ServiceContext};
use crate::utils::isbn;

/// Entry points for every metadata need, built once per process.
pub struct BookServices {
    registry: Arc<ProviderRegistry>,
    priorities: PriorityConfig,
    dedup: Deduplicator,
}

impl BookServices {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        priorities: PriorityConfig,
        dedup: &DedupConfig,
    ) -> Self {
        Self {
            registry,
            priorities,
            dedup: Deduplicator::new(dedup),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Available providers for `capability`, in the order they are consulted.
    pub async fn ordered_providers(
        &self,
        capability: Capability,
        policy: PriorityPolicy,
        ctx: &ServiceContext,
    ) -> Vec<Arc<dyn Provider>> {
        let available = self.registry.providers_for(capability, ctx).await;
        order_providers(available, policy, self.priorities.for_capability(capability))
    }

    pub async fn resolve_isbn(
        &self,
        query: &ResolutionQuery,
        ctx: &ServiceContext,
    ) -> Lookup<ResolutionResult> {
        let capability = Capability::IsbnResolution;
        let providers = self
            .ordered_providers(capability, PriorityPolicy::ConfidenceFirst, ctx)
            .await;
        cascade(capability, providers, ctx, ctx.timeout(), |p| async move {
            match p.as_isbn_resolver() {
                Some(resolver) => resolver.resolve_isbn(query, ctx).await,
                None => Ok(None),
            }
        })
        .await
    }

    /// Cover lookup exhausts free providers before metered ones.
    pub async fn fetch_cover(&self, isbn: &str, ctx: &ServiceContext) -> Lookup<CoverResult> {
        let capability = Capability::CoverImage;
        let providers = self
            .ordered_providers(capability, PriorityPolicy::FreeFirst, ctx)
            .await;
        cascade(capability, providers, ctx, ctx.timeout(), |p| async move {
            match p.as_cover_source() {
                Some(source) => source.fetch_cover(isbn, ctx).await,
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn fetch_ratings(&self, isbn: &str, ctx: &ServiceContext) -> Lookup<RatingsResult> {
        let capability = Capability::Ratings;
        let providers = self
            .ordered_providers(capability, PriorityPolicy::ConfidenceFirst, ctx)
            .await;
        cascade(capability, providers, ctx, ctx.timeout(), |p| async move {
            match p.as_ratings_source() {
                Some(source) => source.fetch_ratings(isbn, ctx).await,
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn detect_public_domain(
        &self,
        query: &PublicDomainQuery,
        ctx: &ServiceContext,
    ) -> Lookup<PublicDomainResult> {
        let capability = Capability::PublicDomain;
        let providers = self
            .ordered_providers(capability, PriorityPolicy::ConfidenceFirst, ctx)
            .await;
        cascade(capability, providers, ctx, ctx.timeout(), |p| async move {
            match p.as_public_domain_detector() {
                Some(detector) => detector.detect_public_domain(query, ctx).await,
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn author_biography(
        &self,
        name: &str,
        ctx: &ServiceContext,
    ) -> Lookup<AuthorBiography> {
        let capability = Capability::AuthorBiography;
        let providers = self
            .ordered_providers(capability, PriorityPolicy::ConfidenceFirst, ctx)
            .await;
        cascade(capability, providers, ctx, ctx.timeout(), |p| async move {
            match p.as_author_bio_source() {
                Some(source) => source.fetch_author_bio(name, ctx).await,
                None => Ok(None),
            }
        })
        .await
    }

    /// Query every metadata provider concurrently and merge the results.
    pub async fn enrich_metadata(&self, raw_isbn: &str, ctx: &ServiceContext) -> Lookup<MergedMetadata> {
        let Some(isbn) = isbn::to_isbn13(raw_isbn) else {
            return Lookup::NotFound;
        };
        let capability = Capability::MetadataEnrichment;
        let providers = self
            .ordered_providers(capability, PriorityPolicy::ConfidenceFirst, ctx)
            .await;
        let isbn_ref = isbn.as_str();
        let gathered = gather(capability, providers, ctx, ctx.timeout(), |p| async move {
            match p.as_metadata_source() {
                Some(source) => source.fetch_metadata(isbn_ref, ctx).await,
                None => Ok(None),
            }
        })
        .await;

        let results = gathered
            .hits
            .into_iter()
            .map(|(_, metadata)| metadata)
            .filter(|m| !m.is_empty())
            .collect();
        merge_metadata(&isbn, results).into()
    }

    pub async fn aggregate_external_ids(
        &self,
        raw_isbn: &str,
        ctx: &ServiceContext,
    ) -> Lookup<MergedExternalIds> {
        let Some(isbn) = isbn::to_isbn13(raw_isbn) else {
            return Lookup::NotFound;
        };
        let capability = Capability::ExternalIds;
        let providers = self
            .ordered_providers(capability, PriorityPolicy::ConfidenceFirst, ctx)
            .await;
        let isbn_ref = isbn.as_str();
        let gathered = gather(capability, providers, ctx, ctx.timeout(), |p| async move {
            match p.as_external_id_source() {
                Some(source) => source.fetch_external_ids(isbn_ref, ctx).await,
                None => Ok(None),
            }
        })
        .await;

        merge_external_ids(gathered.hits.into_iter().map(|(_, ids)| ids).collect()).into()
    }

    pub async fn edition_variants(
        &self,
        raw_isbn: &str,
        ctx: &ServiceContext,
    ) -> Lookup<Vec<EditionVariant>> {
        let Some(isbn) = isbn::to_isbn13(raw_isbn) else {
            return Lookup::NotFound;
        };
        let capability = Capability::EditionVariants;
        let providers = self
            .ordered_providers(capability, PriorityPolicy::ConfidenceFirst, ctx)
            .await;
        let isbn_ref = isbn.as_str();
        let gathered = gather(capability, providers, ctx, ctx.timeout(), |p| async move {
            match p.as_edition_source() {
                Some(source) => source.fetch_editions(isbn_ref, ctx).await,
                None => Ok(None),
            }
        })
        .await;

        let editions = merge_editions(gathered.hits.into_iter().map(|(_, e)| e).collect());
        if editions.is_empty() {
            Lookup::NotFound
        } else {
            Lookup::Found(editions)
        }
    }

    /// Generate a deduplicated list of notable books for a month.
    pub async fn generate_books(
        &self,
        request: &GenerationRequest,
        ctx: &ServiceContext,
    ) -> Lookup<GenerationOutcome> {
        let providers = self
            .ordered_providers(Capability::BookGeneration, PriorityPolicy::ConfidenceFirst, ctx)
            .await;
        generation::generate(providers, request, ctx, &self.dedup).await
    }
}
