//! Process-wide service wiring.
//!
//! Everything here is built once at startup and shared by reference:
//! the HTTP client, the provider registry, the quota manager, and the
//! stores. Per-request state lives in [`ServiceContext`].

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::Settings;
use crate::http_client::{HttpClient, ResponseCache};
use crate::orchestrators::BookServices;
use crate::providers::{builtin_providers, Credentials, ProviderError, ProviderRegistry, ServiceContext};
use crate::quota::{InMemoryKvStore, KvError, KvStore, QuotaManager};
use crate::repository::{
    BackfillStore, CatalogStore, InMemoryBackfillStore, InMemoryCatalogStore, StoreError,
};
use crate::scheduler::{BackfillScheduler, GenerationPipeline};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP client setup failed: {0}")]
    Http(#[from] ProviderError),
    #[error("Store setup failed: {0}")]
    Store(#[from] StoreError),
    #[error("Key-value store setup failed: {0}")]
    Kv(#[from] KvError),
}

pub struct AppServices {
    pub settings: Settings,
    pub credentials: Arc<Credentials>,
    pub quota: Arc<QuotaManager>,
    pub books: Arc<BookServices>,
    pub backfill: Arc<dyn BackfillStore>,
    pub catalog: Arc<dyn CatalogStore>,
}

impl AppServices {
    pub async fn build(settings: Settings) -> Result<Self, AppError> {
        let credentials = Arc::new(Credentials::from_env());
        let kv = connect_kv(&settings).await;
        let quota = Arc::new(QuotaManager::new(Arc::clone(&kv), settings.quota.clone()));

        let mut http = HttpClient::new(&settings.user_agent, settings.request_timeout())?;
        if let Some(ttl) = settings.cache_ttl() {
            http = http.with_cache(ResponseCache::new(Arc::clone(&kv), ttl));
        }

        let mut registry = ProviderRegistry::new();
        for provider in builtin_providers(&http, &settings.llm) {
            registry.register(provider);
        }
        let books = Arc::new(BookServices::new(
            Arc::new(registry),
            settings.priorities.clone(),
            &settings.dedup,
        ));

        let (backfill, catalog) = connect_stores(&settings).await?;

        Ok(Self {
            settings,
            credentials,
            quota,
            books,
            backfill,
            catalog,
        })
    }

    /// A fresh per-request context carrying credentials, quota and catalog.
    pub fn context(&self) -> ServiceContext {
        ServiceContext::new(Arc::clone(&self.credentials))
            .with_quota(Arc::clone(&self.quota))
            .with_catalog(Arc::clone(&self.catalog))
            .with_timeout(self.settings.request_timeout())
            .with_generation_timeout(self.settings.generation_timeout())
    }

    pub fn scheduler(&self) -> BackfillScheduler {
        let pipeline = GenerationPipeline::new(
            Arc::clone(&self.books),
            Arc::clone(&self.credentials),
            Arc::clone(&self.catalog),
            self.settings.pipeline(),
        )
        .with_quota(Arc::clone(&self.quota));

        BackfillScheduler::new(
            Arc::clone(&self.backfill),
            Arc::new(pipeline),
            self.settings.scheduler.clone(),
        )
        .with_quota(Arc::clone(&self.quota))
    }
}

/// Redis when configured and reachable, otherwise a process-local store.
async fn connect_kv(settings: &Settings) -> Arc<dyn KvStore> {
    let Some(url) = settings.redis_url.as_deref() else {
        return Arc::new(InMemoryKvStore::new());
    };

    #[cfg(feature = "redis-backend")]
    {
        match crate::quota::RedisKvStore::new(url).await {
            Ok(store) => {
                info!("Using Redis for quota counters and response cache");
                return Arc::new(store);
            }
            Err(e) => warn!(
                "Redis unavailable ({}); quota counters are local to this process",
                e
            ),
        }
    }
    #[cfg(not(feature = "redis-backend"))]
    warn!(
        "REDIS_URL {} ignored: built without the redis-backend feature",
        url
    );

    Arc::new(InMemoryKvStore::new())
}

async fn connect_stores(
    settings: &Settings,
) -> Result<(Arc<dyn BackfillStore>, Arc<dyn CatalogStore>), StoreError> {
    if let Some(url) = settings.database_url.as_deref() {
        #[cfg(feature = "postgres")]
        if crate::repository::pool::is_postgres_url(url) {
            use crate::repository::{
                run_migrations, DieselBackfillStore, DieselCatalogStore, PgPool,
            };

            let pool = PgPool::new(url, settings.pool_size)?;
            run_migrations(&pool).await?;
            info!("Using PostgreSQL for backfill state and catalog");
            let backfill = DieselBackfillStore::new(pool.clone())
                .with_overfetch(settings.scheduler.candidate_overfetch);
            return Ok((Arc::new(backfill), Arc::new(DieselCatalogStore::new(pool))));
        }

        warn!(
            "Unsupported DATABASE_URL '{}'; backfill state is in memory",
            redact(url)
        );
    }

    let backfill =
        InMemoryBackfillStore::new().with_overfetch(settings.scheduler.candidate_overfetch);
    Ok((Arc::new(backfill), Arc::new(InMemoryCatalogStore::new())))
}

/// Hide the password in a connection URL.
fn redact(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("****"));
            parsed.to_string()
        }
        Ok(parsed) => parsed.to_string(),
        Err(_) => "<unparseable>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_password() {
        assert_eq!(
            redact("postgres://folio:secret@db:5432/folio"),
            "postgres://folio:****@db:5432/folio"
        );
        assert_eq!(redact("not a url"), "<unparseable>");
    }

    #[tokio::test]
    async fn test_defaults_to_memory_backends() {
        let services = AppServices::build(Settings::default()).await.unwrap();
        assert_eq!(services.books.registry().len(), 7);
        assert!(services.backfill.list_candidates(1).await.unwrap().is_empty());
        assert_eq!(services.catalog.count_books().await.unwrap(), 0);
    }
}
