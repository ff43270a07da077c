//! Per-unit processing: generate a month's notable books, resolve each
//! to an ISBN, enrich, and write the catalog.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, info_span, warn};

use super::error::ProcessError;
use crate::models::{
    CatalogBook, GenerationRequest, Lookup, ResolutionQuery, UnitKey, UnitStats,
};
use crate::orchestrators::BookServices;
use crate::providers::{Credentials, ServiceContext};
use crate::quota::{OperationKind, QuotaManager};
use crate::repository::CatalogStore;

/// Work performed for one claimed unit.
#[async_trait]
pub trait UnitProcessor: Send + Sync {
    async fn process(&self, key: UnitKey) -> Result<UnitStats, ProcessError>;
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub books_per_month: usize,
    /// Merge metadata from every source into each catalog row.
    pub enrich: bool,
    pub timeout: Duration,
    pub generation_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            books_per_month: 20,
            enrich: true,
            timeout: ServiceContext::DEFAULT_TIMEOUT,
            generation_timeout: ServiceContext::DEFAULT_GENERATION_TIMEOUT,
        }
    }
}

pub struct GenerationPipeline {
    services: Arc<BookServices>,
    credentials: Arc<Credentials>,
    quota: Option<Arc<QuotaManager>>,
    catalog: Arc<dyn CatalogStore>,
    config: PipelineConfig,
}

impl GenerationPipeline {
    pub fn new(
        services: Arc<BookServices>,
        credentials: Arc<Credentials>,
        catalog: Arc<dyn CatalogStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            services,
            credentials,
            quota: None,
            catalog,
            config,
        }
    }

    pub fn with_quota(mut self, quota: Arc<QuotaManager>) -> Self {
        self.quota = Some(quota);
        self
    }

    fn context(&self, key: UnitKey) -> ServiceContext {
        let mut ctx = ServiceContext::new(Arc::clone(&self.credentials))
            .with_catalog(Arc::clone(&self.catalog))
            .with_timeout(self.config.timeout)
            .with_generation_timeout(self.config.generation_timeout)
            .with_span(info_span!("unit", unit = %key));
        if let Some(quota) = &self.quota {
            ctx = ctx.with_quota(Arc::clone(quota));
        }
        ctx
    }

    async fn admit(&self, key: UnitKey) -> Result<(), ProcessError> {
        let Some(quota) = &self.quota else {
            return Ok(());
        };
        let decision = quota
            .should_allow_operation(OperationKind::Cron, self.config.books_per_month as u64)
            .await;
        if decision.allowed {
            Ok(())
        } else {
            let reason = decision
                .reason
                .unwrap_or_else(|| "operation not allowed".to_string());
            debug!("Unit {} refused by quota: {}", key, reason);
            Err(ProcessError::QuotaExhausted(reason))
        }
    }

    async fn quota_spent(&self) -> bool {
        match &self.quota {
            Some(quota) => !quota.check_quota(1, false).await.allowed,
            None => false,
        }
    }
}

#[async_trait]
impl UnitProcessor for GenerationPipeline {
    async fn process(&self, key: UnitKey) -> Result<UnitStats, ProcessError> {
        self.admit(key).await?;
        let ctx = self.context(key);

        let request = GenerationRequest {
            year: key.year,
            month: key.month,
            count: self.config.books_per_month,
        };
        let outcome = match self.services.generate_books(&request, &ctx).await {
            Lookup::Found(outcome) => outcome,
            Lookup::NotFound => return Err(ProcessError::NothingGenerated(key.to_string())),
        };

        let mut resolved = 0u32;
        let mut unresolved = 0u32;
        for book in &outcome.books {
            let query = ResolutionQuery::new(book.title.clone(), book.author.clone());
            let resolution = match self.services.resolve_isbn(&query, &ctx).await {
                Lookup::Found(resolution) => resolution,
                Lookup::NotFound => {
                    debug!("No ISBN for \"{}\"", book.title);
                    unresolved += 1;
                    continue;
                }
            };

            let mut row = CatalogBook::from_resolution(book, &resolution, Some(key));
            if self.config.enrich {
                if let Lookup::Found(merged) =
                    self.services.enrich_metadata(&resolution.isbn, &ctx).await
                {
                    row.apply_metadata(&merged.metadata);
                }
            }
            self.catalog.upsert_book(&row).await?;
            resolved += 1;
        }

        if unresolved > 0 && self.quota_spent().await {
            warn!(
                "Quota ran out in {} with {} book(s) unresolved",
                key, unresolved
            );
            return Err(ProcessError::QuotaExhausted(format!(
                "daily budget spent with {} of {} books unresolved",
                unresolved,
                outcome.books.len()
            )));
        }

        info!(
            "Unit {}: {} of {} books resolved",
            key,
            resolved,
            outcome.books.len()
        );
        Ok(UnitStats {
            books_generated: outcome.books.len() as u32,
            isbns_resolved: resolved,
            provider_calls: ctx.call_tally(),
        })
    }
}
