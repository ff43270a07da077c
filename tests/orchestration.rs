//! Orchestration strategies against scripted providers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use folio::dedup::DedupConfig;
use folio::models::{
    BookMetadata, Capability, GeneratedBook, GenerationRequest, Lookup, ProviderKind,
    ResolutionQuery, ResolutionResult,
};
use folio::orchestrators::{BookServices, PriorityConfig};
use folio::providers::{
    BookGenerator, Credentials, IsbnResolver, MetadataSource, Provider, ProviderError,
    ProviderRegistry, ProviderResult, ServiceContext,
};

const DUNE: &str = "9780441013593";
const EXAMPLE: &str = "9780306406157";

#[derive(Clone)]
enum Script<T> {
    Fail,
    Empty,
    Return(T),
    Sleep(Duration, T),
}

impl<T: Clone> Script<T> {
    async fn play(&self, name: &str) -> ProviderResult<T> {
        match self {
            Script::Fail => Err(ProviderError::Http(format!("{name} is down"))),
            Script::Empty => Ok(None),
            Script::Return(value) => Ok(Some(value.clone())),
            Script::Sleep(delay, value) => {
                tokio::time::sleep(*delay).await;
                Ok(Some(value.clone()))
            }
        }
    }
}

struct Fake {
    name: &'static str,
    kind: ProviderKind,
    confidence: u8,
    calls: AtomicUsize,
    resolve: Option<Script<String>>,
    metadata: Option<Script<BookMetadata>>,
    generate: Option<Script<Vec<GeneratedBook>>>,
}

impl Fake {
    fn new(name: &'static str, kind: ProviderKind, confidence: u8) -> Self {
        Self {
            name,
            kind,
            confidence,
            calls: AtomicUsize::new(0),
            resolve: None,
            metadata: None,
            generate: None,
        }
    }

    fn resolving(mut self, script: Script<&str>) -> Self {
        self.resolve = Some(match script {
            Script::Fail => Script::Fail,
            Script::Empty => Script::Empty,
            Script::Return(isbn) => Script::Return(isbn.to_string()),
            Script::Sleep(d, isbn) => Script::Sleep(d, isbn.to_string()),
        });
        self
    }

    fn describing(mut self, script: Script<BookMetadata>) -> Self {
        self.metadata = Some(script);
        self
    }

    fn generating(mut self, script: Script<Vec<GeneratedBook>>) -> Self {
        self.generate = Some(script);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for Fake {
    fn name(&self) -> &str {
        self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn confidence(&self) -> u8 {
        self.confidence
    }

    fn as_isbn_resolver(&self) -> Option<&dyn IsbnResolver> {
        self.resolve.as_ref().map(|_| self as &dyn IsbnResolver)
    }

    fn as_metadata_source(&self) -> Option<&dyn MetadataSource> {
        self.metadata.as_ref().map(|_| self as &dyn MetadataSource)
    }

    fn as_book_generator(&self) -> Option<&dyn BookGenerator> {
        self.generate.as_ref().map(|_| self as &dyn BookGenerator)
    }
}

#[async_trait]
impl IsbnResolver for Fake {
    async fn resolve_isbn(
        &self,
        query: &ResolutionQuery,
        _ctx: &ServiceContext,
    ) -> ProviderResult<ResolutionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Some(script) = &self.resolve else {
            return Ok(None);
        };
        Ok(script.play(self.name).await?.map(|isbn| ResolutionResult {
            isbn,
            title: query.title.clone(),
            authors: query.author.iter().cloned().collect(),
            confidence: self.confidence,
            source: self.name.to_string(),
        }))
    }
}

#[async_trait]
impl MetadataSource for Fake {
    async fn fetch_metadata(
        &self,
        _isbn: &str,
        _ctx: &ServiceContext,
    ) -> ProviderResult<BookMetadata> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.metadata {
            Some(script) => script.play(self.name).await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl BookGenerator for Fake {
    async fn generate_books(
        &self,
        _request: &GenerationRequest,
        _ctx: &ServiceContext,
    ) -> ProviderResult<Vec<GeneratedBook>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.generate {
            Some(script) => script.play(self.name).await,
            None => Ok(None),
        }
    }
}

fn services(providers: &[Arc<Fake>], priorities: PriorityConfig) -> BookServices {
    let mut registry = ProviderRegistry::new();
    for provider in providers {
        assert!(registry.register(Arc::clone(provider) as Arc<dyn Provider>));
    }
    BookServices::new(Arc::new(registry), priorities, &DedupConfig::default())
}

fn context() -> ServiceContext {
    ServiceContext::new(Arc::new(Credentials::default()))
}

fn metadata(source: &str, confidence: u8, title: &str, subjects: &[&str]) -> BookMetadata {
    BookMetadata {
        title: Some(title.to_string()),
        subjects: subjects.iter().map(|s| s.to_string()).collect(),
        ..BookMetadata::new(DUNE, source, confidence)
    }
}

fn generated(title: &str, source: &str) -> GeneratedBook {
    GeneratedBook {
        title: title.to_string(),
        author: None,
        publication_year: Some(1969),
        isbn: None,
        significance: None,
        source: source.to_string(),
    }
}

#[tokio::test]
async fn test_cascade_follows_explicit_order() {
    let p1 = Arc::new(Fake::new("p1", ProviderKind::Paid, 95).resolving(Script::Fail));
    let p2 = Arc::new(Fake::new("p2", ProviderKind::Free, 60).resolving(Script::Return(DUNE)));
    let p3 = Arc::new(Fake::new("p3", ProviderKind::Free, 90).resolving(Script::Return(EXAMPLE)));
    let priorities = PriorityConfig::default().with_override(
        Capability::IsbnResolution,
        &["p1", "p2", "p3"],
    );
    let books = services(&[p3.clone(), p2.clone(), p1.clone()], priorities);

    let query = ResolutionQuery::new("Dune", Some("Frank Herbert".to_string()));
    let result = books.resolve_isbn(&query, &context()).await;

    let Lookup::Found(resolved) = result else {
        panic!("expected a resolution");
    };
    assert_eq!(resolved.isbn, DUNE);
    assert_eq!(resolved.source, "p2");
    assert_eq!(p1.calls(), 1);
    assert_eq!(p3.calls(), 0);
}

#[tokio::test]
async fn test_cascade_defaults_to_highest_confidence() {
    let low = Arc::new(Fake::new("low", ProviderKind::Free, 60).resolving(Script::Return(DUNE)));
    let high =
        Arc::new(Fake::new("high", ProviderKind::Free, 90).resolving(Script::Return(EXAMPLE)));
    let books = services(&[low.clone(), high.clone()], PriorityConfig::default());

    let result = books
        .resolve_isbn(&ResolutionQuery::new("Anything", None), &context())
        .await
        .into_option()
        .unwrap();
    assert_eq!(result.source, "high");
    assert_eq!(low.calls(), 0);
}

#[tokio::test]
async fn test_cascade_skips_invalid_and_slow_providers() {
    // Checksum digit is wrong.
    let bad = Arc::new(
        Fake::new("bad", ProviderKind::Paid, 95).resolving(Script::Return("9780306406158")),
    );
    let slow = Arc::new(Fake::new("slow", ProviderKind::Free, 90).resolving(Script::Sleep(
        Duration::from_secs(5),
        EXAMPLE,
    )));
    let good = Arc::new(Fake::new("good", ProviderKind::Free, 50).resolving(Script::Return(DUNE)));
    let books = services(
        &[bad.clone(), slow.clone(), good.clone()],
        PriorityConfig::default(),
    );
    let ctx = context().with_timeout(Duration::from_millis(100));

    let started = Instant::now();
    let result = books
        .resolve_isbn(&ResolutionQuery::new("Dune", None), &ctx)
        .await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(result.into_option().map(|r| r.source), Some("good".to_string()));
    assert_eq!(slow.calls(), 1);
}

#[tokio::test]
async fn test_cascade_all_failing_is_not_found() {
    let a = Arc::new(Fake::new("a", ProviderKind::Free, 80).resolving(Script::Fail));
    let b = Arc::new(Fake::new("b", ProviderKind::Free, 70).resolving(Script::Empty));
    let books = services(&[a, b], PriorityConfig::default());

    let result = books
        .resolve_isbn(&ResolutionQuery::new("Unknown", None), &context())
        .await;
    assert_eq!(result, Lookup::NotFound);
}

#[tokio::test]
async fn test_enrichment_merges_case_insensitive_subjects() {
    let primary = Arc::new(Fake::new("primary", ProviderKind::Paid, 95).describing(
        Script::Return(metadata("primary", 95, "Dune", &["Science Fiction", "Classics"])),
    ));
    let secondary = Arc::new(Fake::new("secondary", ProviderKind::Free, 70).describing(
        Script::Return(metadata("secondary", 70, "DUNE", &["science fiction", "Ecology"])),
    ));
    let broken = Arc::new(Fake::new("broken", ProviderKind::Free, 80).describing(Script::Fail));
    let books = services(
        &[secondary, broken, primary],
        PriorityConfig::default(),
    );

    let merged = books
        .enrich_metadata(DUNE, &context())
        .await
        .into_option()
        .unwrap();
    assert_eq!(merged.metadata.title.as_deref(), Some("Dune"));
    assert_eq!(
        merged.metadata.subjects,
        vec!["Science Fiction", "Classics", "Ecology"]
    );
    assert_eq!(merged.sources, vec!["primary", "secondary"]);
}

#[tokio::test]
async fn test_slow_metadata_source_does_not_block_siblings() {
    let fast = Arc::new(Fake::new("fast", ProviderKind::Free, 70).describing(Script::Return(
        metadata("fast", 70, "Dune", &["Science Fiction"]),
    )));
    let slow = Arc::new(Fake::new("slow", ProviderKind::Paid, 95).describing(Script::Sleep(
        Duration::from_secs(5),
        metadata("slow", 95, "Dune Messiah", &[]),
    )));
    let books = services(&[fast, slow.clone()], PriorityConfig::default());
    let ctx = context().with_timeout(Duration::from_millis(150));

    let started = Instant::now();
    let merged = books.enrich_metadata(DUNE, &ctx).await.into_option().unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(merged.sources, vec!["fast"]);
    assert_eq!(merged.metadata.title.as_deref(), Some("Dune"));
    assert_eq!(slow.calls(), 1);
}

#[tokio::test]
async fn test_enrichment_rejects_malformed_isbn() {
    let source = Arc::new(Fake::new("src", ProviderKind::Free, 70).describing(Script::Return(
        metadata("src", 70, "Dune", &[]),
    )));
    let books = services(&[source.clone()], PriorityConfig::default());

    assert_eq!(books.enrich_metadata("12345", &context()).await, Lookup::NotFound);
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_generation_deduplicates_across_providers() {
    let first = Arc::new(Fake::new("first", ProviderKind::Ai, 80).generating(Script::Return(
        vec![
            generated("The Left Hand of Darkness", "first"),
            generated("Slaughterhouse-Five", "first"),
        ],
    )));
    let second = Arc::new(Fake::new("second", ProviderKind::Ai, 70).generating(Script::Return(
        vec![
            generated("Left Hand of Darkness", "second"),
            generated("Ada or Ardor", "second"),
        ],
    )));
    let down = Arc::new(Fake::new("down", ProviderKind::Ai, 60).generating(Script::Fail));
    let books = services(&[second, down, first], PriorityConfig::default());

    let request = GenerationRequest {
        year: 1969,
        month: 3,
        count: 10,
    };
    let outcome = books
        .generate_books(&request, &context())
        .await
        .into_option()
        .unwrap();

    let titles: Vec<&str> = outcome.books.iter().map(|b| b.title.as_str()).collect();
    assert_eq!(
        titles,
        vec!["The Left Hand of Darkness", "Slaughterhouse-Five", "Ada or Ardor"]
    );
    assert_eq!(outcome.duplicates_removed, 1);
    assert_eq!(outcome.failed_providers, vec!["down"]);
    assert_eq!(outcome.per_provider["first"], 2);
    assert_eq!(outcome.per_provider["second"], 2);
}

#[tokio::test]
async fn test_generation_with_no_results_is_not_found() {
    let down = Arc::new(Fake::new("down", ProviderKind::Ai, 60).generating(Script::Fail));
    let idle = Arc::new(Fake::new("idle", ProviderKind::Ai, 50).generating(Script::Empty));
    let books = services(&[down, idle], PriorityConfig::default());

    let request = GenerationRequest {
        year: 2001,
        month: 1,
        count: 5,
    };
    assert_eq!(
        books.generate_books(&request, &context()).await,
        Lookup::NotFound
    );
}
