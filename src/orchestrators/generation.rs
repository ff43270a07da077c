//! Concurrent book-list generation with fuzzy deduplication.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::aggregate::gather;
use crate::dedup::Deduplicator;
use crate::models::{Capability, GenerationOutcome, GenerationRequest, Lookup};
use crate::providers::{Provider, ServiceContext};

/// Ask every generator concurrently and merge the candidates.
///
/// Candidates are concatenated in provider order before deduplication, so
/// the first provider's version of a book is the one kept. Succeeds when
/// any provider returned books.
pub async fn generate(
    providers: Vec<Arc<dyn Provider>>,
    request: &GenerationRequest,
    ctx: &ServiceContext,
    dedup: &Deduplicator,
) -> Lookup<GenerationOutcome> {
    let gathered = gather(
        Capability::BookGeneration,
        providers,
        ctx,
        ctx.generation_timeout(),
        |provider| async move {
            match provider.as_book_generator() {
                Some(generator) => generator.generate_books(request, ctx).await,
                None => Ok(None),
            }
        },
    )
    .await;

    if gathered.is_empty() {
        warn!(
            "No generator returned books for {}-{:02} (failed: {:?})",
            request.year, request.month, gathered.failed
        );
        return Lookup::NotFound;
    }

    let mut per_provider = BTreeMap::new();
    let mut candidates = Vec::new();
    for (provider, books) in gathered.hits {
        per_provider.insert(provider.name().to_string(), books.len());
        candidates.extend(books);
    }

    let (books, duplicates_removed) = dedup.dedup(candidates);
    info!(
        "Generated {} unique books for {}-{:02} ({} duplicates removed)",
        books.len(),
        request.year,
        request.month,
        duplicates_removed
    );

    Lookup::Found(GenerationOutcome {
        books,
        per_provider,
        failed_providers: gathered.failed,
        duplicates_removed,
    })
}
