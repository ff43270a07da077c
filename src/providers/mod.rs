//! External metadata providers.
//!
//! Each provider adapts one external source and implements one or more
//! capability traits. A provider exposes its capabilities through the
//! `as_*` accessors on [`Provider`]; the registry derives the capability
//! index from those accessors at registration time.

mod archive_org;
mod context;
mod error;
mod gemini;
mod google_books;
mod isbndb;
mod open_library;
mod registry;
mod wikidata;
mod xai;

pub use archive_org::ArchiveOrgProvider;
pub use context::{Credentials, ServiceContext, CREDENTIAL_VARS};
pub use error::{ProviderError, ProviderResult};
pub use gemini::GeminiProvider;
pub use google_books::GoogleBooksProvider;
pub use isbndb::IsbndbProvider;
pub use open_library::OpenLibraryProvider;
pub use registry::ProviderRegistry;
pub use wikidata::WikidataProvider;
pub use xai::XaiProvider;

use async_trait::async_trait;

use crate::models::{
    AuthorBiography, BookMetadata, Capability, CoverResult, EditionVariant, ExternalIds,
    GeneratedBook, GenerationRequest, ProviderKind, PublicDomainQuery, PublicDomainResult,
    RatingsResult, ResolutionQuery, ResolutionResult,
};

/// Resolve a title/author pair to an ISBN.
#[async_trait]
pub trait IsbnResolver: Send + Sync {
    async fn resolve_isbn(
        &self,
        query: &ResolutionQuery,
        ctx: &ServiceContext,
    ) -> ProviderResult<ResolutionResult>;
}

#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch_metadata(&self, isbn: &str, ctx: &ServiceContext)
        -> ProviderResult<BookMetadata>;
}

#[async_trait]
pub trait CoverSource: Send + Sync {
    async fn fetch_cover(&self, isbn: &str, ctx: &ServiceContext) -> ProviderResult<CoverResult>;
}

#[async_trait]
pub trait RatingsSource: Send + Sync {
    async fn fetch_ratings(&self, isbn: &str, ctx: &ServiceContext)
        -> ProviderResult<RatingsResult>;
}

#[async_trait]
pub trait PublicDomainDetector: Send + Sync {
    async fn detect_public_domain(
        &self,
        query: &PublicDomainQuery,
        ctx: &ServiceContext,
    ) -> ProviderResult<PublicDomainResult>;
}

#[async_trait]
pub trait EditionSource: Send + Sync {
    async fn fetch_editions(
        &self,
        isbn: &str,
        ctx: &ServiceContext,
    ) -> ProviderResult<Vec<EditionVariant>>;
}

#[async_trait]
pub trait ExternalIdSource: Send + Sync {
    async fn fetch_external_ids(
        &self,
        isbn: &str,
        ctx: &ServiceContext,
    ) -> ProviderResult<ExternalIds>;
}

#[async_trait]
pub trait AuthorBioSource: Send + Sync {
    async fn fetch_author_bio(
        &self,
        name: &str,
        ctx: &ServiceContext,
    ) -> ProviderResult<AuthorBiography>;
}

/// Generate a list of notable books for a period.
#[async_trait]
pub trait BookGenerator: Send + Sync {
    async fn generate_books(
        &self,
        request: &GenerationRequest,
        ctx: &ServiceContext,
    ) -> ProviderResult<Vec<GeneratedBook>>;
}

/// Descriptor shared by every provider.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Unique identifier (e.g., "isbndb", "open_library").
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Default confidence (0-100) of results from this provider.
    fn confidence(&self) -> u8;

    /// Evaluated before every call; never cached.
    async fn is_available(&self, _ctx: &ServiceContext) -> bool {
        true
    }

    fn as_isbn_resolver(&self) -> Option<&dyn IsbnResolver> {
        None
    }

    fn as_metadata_source(&self) -> Option<&dyn MetadataSource> {
        None
    }

    fn as_cover_source(&self) -> Option<&dyn CoverSource> {
        None
    }

    fn as_ratings_source(&self) -> Option<&dyn RatingsSource> {
        None
    }

    fn as_public_domain_detector(&self) -> Option<&dyn PublicDomainDetector> {
        None
    }

    fn as_edition_source(&self) -> Option<&dyn EditionSource> {
        None
    }

    fn as_external_id_source(&self) -> Option<&dyn ExternalIdSource> {
        None
    }

    fn as_author_bio_source(&self) -> Option<&dyn AuthorBioSource> {
        None
    }

    fn as_book_generator(&self) -> Option<&dyn BookGenerator> {
        None
    }

    /// Whether this provider implements `capability`.
    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::IsbnResolution => self.as_isbn_resolver().is_some(),
            Capability::MetadataEnrichment => self.as_metadata_source().is_some(),
            Capability::CoverImage => self.as_cover_source().is_some(),
            Capability::Ratings => self.as_ratings_source().is_some(),
            Capability::PublicDomain => self.as_public_domain_detector().is_some(),
            Capability::EditionVariants => self.as_edition_source().is_some(),
            Capability::ExternalIds => self.as_external_id_source().is_some(),
            Capability::AuthorBiography => self.as_author_bio_source().is_some(),
            Capability::BookGeneration => self.as_book_generator().is_some(),
        }
    }

    fn capabilities(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|c| self.supports(*c))
            .collect()
    }
}

/// Register the built-in providers.
pub fn builtin_providers(
    http: &crate::http_client::HttpClient,
    llm: &crate::llm::LlmConfig,
) -> Vec<std::sync::Arc<dyn Provider>> {
    use std::sync::Arc;

    vec![
        Arc::new(IsbndbProvider::new(http.clone())),
        Arc::new(GoogleBooksProvider::new(http.clone())),
        Arc::new(OpenLibraryProvider::new(http.clone())),
        Arc::new(ArchiveOrgProvider::new(http.clone())),
        Arc::new(WikidataProvider::new(http.clone())),
        Arc::new(GeminiProvider::new(http.clone(), llm.clone())),
        Arc::new(XaiProvider::new(http.clone(), llm.clone())),
    ]
}
