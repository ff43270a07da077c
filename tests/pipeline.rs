//! A backfill unit end to end: generation, resolution, catalog writes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use folio::dedup::DedupConfig;
use folio::models::{
    GeneratedBook, GenerationRequest, ProviderKind, ResolutionQuery, ResolutionResult, UnitKey,
    UnitStatus,
};
use folio::orchestrators::{BookServices, PriorityConfig};
use folio::providers::{
    BookGenerator, Credentials, IsbnResolver, Provider, ProviderRegistry, ProviderResult,
    ServiceContext,
};
use folio::quota::{InMemoryKvStore, QuotaConfig, QuotaManager};
use folio::repository::{BackfillStore, CatalogStore, InMemoryBackfillStore, InMemoryCatalogStore};
use folio::scheduler::{
    BackfillScheduler, GenerationPipeline, PipelineConfig, SchedulerConfig, UnitOutcome,
};

struct Oracle;

#[async_trait]
impl Provider for Oracle {
    fn name(&self) -> &str {
        "oracle"
    }
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ai
    }
    fn confidence(&self) -> u8 {
        70
    }
    fn as_book_generator(&self) -> Option<&dyn BookGenerator> {
        Some(self)
    }
}

#[async_trait]
impl BookGenerator for Oracle {
    async fn generate_books(
        &self,
        request: &GenerationRequest,
        _ctx: &ServiceContext,
    ) -> ProviderResult<Vec<GeneratedBook>> {
        let book = |title: &str, author: &str| GeneratedBook {
            title: title.to_string(),
            author: Some(author.to_string()),
            publication_year: Some(request.year),
            isbn: None,
            significance: Some("Widely reviewed".to_string()),
            source: "oracle".to_string(),
        };
        Ok(Some(vec![
            book("Dune", "Frank Herbert"),
            book("DUNE!", "Frank Herbert"),
            book("Theory of Everything Else", "Nobody"),
        ]))
    }
}

struct Shelf {
    known: HashMap<&'static str, &'static str>,
}

#[async_trait]
impl Provider for Shelf {
    fn name(&self) -> &str {
        "lookup"
    }
    fn kind(&self) -> ProviderKind {
        ProviderKind::Free
    }
    fn confidence(&self) -> u8 {
        80
    }
    fn as_isbn_resolver(&self) -> Option<&dyn IsbnResolver> {
        Some(self)
    }
}

#[async_trait]
impl IsbnResolver for Shelf {
    async fn resolve_isbn(
        &self,
        query: &ResolutionQuery,
        _ctx: &ServiceContext,
    ) -> ProviderResult<ResolutionResult> {
        Ok(self.known.get(query.title.as_str()).map(|isbn| ResolutionResult {
            isbn: isbn.to_string(),
            title: query.title.clone(),
            authors: vec![],
            confidence: 80,
            source: "lookup".to_string(),
        }))
    }
}

struct Harness {
    store: Arc<dyn BackfillStore>,
    catalog: Arc<InMemoryCatalogStore>,
    scheduler: BackfillScheduler,
}

fn harness(quota: Option<QuotaConfig>) -> Harness {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(Oracle));
    registry.register(Arc::new(Shelf {
        known: HashMap::from([("Dune", "9780441013593")]),
    }));
    let services = Arc::new(BookServices::new(
        Arc::new(registry),
        PriorityConfig::default(),
        &DedupConfig::default(),
    ));

    let store: Arc<dyn BackfillStore> = Arc::new(InMemoryBackfillStore::new());
    let catalog = Arc::new(InMemoryCatalogStore::new());
    let config = PipelineConfig {
        books_per_month: 3,
        enrich: false,
        ..Default::default()
    };
    let mut pipeline = GenerationPipeline::new(
        services,
        Arc::new(Credentials::default()),
        Arc::clone(&catalog) as Arc<dyn CatalogStore>,
        config,
    );
    if let Some(quota) = quota {
        pipeline = pipeline.with_quota(Arc::new(QuotaManager::new(
            Arc::new(InMemoryKvStore::new()),
            quota,
        )));
    }

    let scheduler = BackfillScheduler::new(
        Arc::clone(&store),
        Arc::new(pipeline),
        SchedulerConfig::default(),
    );
    Harness {
        store,
        catalog,
        scheduler,
    }
}

#[tokio::test]
async fn test_unit_writes_resolved_books_to_catalog() {
    let h = harness(None);
    let key = UnitKey::new(1965, 8).unwrap();
    h.store.seed_units(&[key]).await.unwrap();

    let report = h.scheduler.run_batch(Some(1), false).await.unwrap();
    let UnitOutcome::Completed { stats } = &report.units[0].outcome else {
        panic!("unit did not complete: {:?}", report.units[0].outcome);
    };
    assert_eq!(stats.books_generated, 2);
    assert_eq!(stats.isbns_resolved, 1);

    let book = h.catalog.find_by_isbn("9780441013593").await.unwrap().unwrap();
    assert_eq!(book.title, "Dune");
    assert_eq!(book.authors, vec!["Frank Herbert"]);
    assert_eq!(book.resolved_by, "lookup");
    assert_eq!(book.discovered_in, Some(key));
    assert_eq!(h.catalog.count_books().await.unwrap(), 1);

    let unit = h.store.get_unit(key).await.unwrap().unwrap();
    assert_eq!(unit.status, UnitStatus::Completed);
    assert_eq!(unit.resolution_rate, Some(0.5));
}

#[tokio::test]
async fn test_cron_admission_defers_unit_without_spending_retry() {
    // Three books need a doubled buffer of six; only five remain.
    let h = harness(Some(QuotaConfig {
        daily_limit: 5,
        ..Default::default()
    }));
    let key = UnitKey::new(1972, 4).unwrap();
    h.store.seed_units(&[key]).await.unwrap();

    let report = h.scheduler.run_batch(Some(1), false).await.unwrap();
    assert!(matches!(
        report.units[0].outcome,
        UnitOutcome::Retry {
            transient: true,
            ..
        }
    ));
    let unit = h.store.get_unit(key).await.unwrap().unwrap();
    assert_eq!(unit.status, UnitStatus::Retry);
    assert_eq!(unit.retry_count, 0);
    assert_eq!(h.catalog.count_books().await.unwrap(), 0);
}
