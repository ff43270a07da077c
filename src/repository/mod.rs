//! Persistence for backfill units and the book catalog.
//!
//! [`BackfillStore`] owns the unit state machine and the claim protocol;
//! [`CatalogStore`] holds resolved books keyed by ISBN. Each has an
//! in-memory implementation and, with the `postgres` feature, a Diesel
//! implementation over a deadpool-managed `AsyncPgConnection` pool.

mod memory;

#[cfg(feature = "postgres")]
mod diesel_backfill;
#[cfg(feature = "postgres")]
mod diesel_catalog;
#[cfg(feature = "postgres")]
mod migrations;
#[cfg(feature = "postgres")]
pub mod pool;
#[cfg(feature = "postgres")]
mod records;
#[cfg(feature = "postgres")]
pub mod schema;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::{
    BackfillUnit, CatalogBook, FailureKind, StatusSummary, UnitKey, UnitStats, UnitStatus,
};

pub use memory::{InMemoryBackfillStore, InMemoryCatalogStore};

#[cfg(feature = "postgres")]
pub use diesel_backfill::DieselBackfillStore;
#[cfg(feature = "postgres")]
pub use diesel_catalog::DieselCatalogStore;
#[cfg(feature = "postgres")]
pub use migrations::run_migrations;
#[cfg(feature = "postgres")]
pub use pool::PgPool;

/// Default number of candidates read per requested claim. Contended units
/// are skipped, so reading extra keeps a batch full.
pub const DEFAULT_CANDIDATE_OVERFETCH: usize = 3;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Unit {0} not found")]
    NotFound(UnitKey),

    #[error("Unit {key} is {status}, not processing")]
    NotProcessing { key: UnitKey, status: String },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// What one claim attempt did with each candidate it looked at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClaimOutcome {
    /// Units now `processing` and owned by the caller (or, in a dry run,
    /// units that would have been claimed).
    pub claimed: Vec<UnitKey>,
    /// Advisory lock held by another session.
    pub skipped_locked: Vec<UnitKey>,
    /// Status changed between the candidate read and the guarded update.
    pub skipped_taken: Vec<UnitKey>,
    pub dry_run: bool,
}

impl ClaimOutcome {
    pub fn skipped(&self) -> usize {
        self.skipped_locked.len() + self.skipped_taken.len()
    }
}

/// State store for backfill units.
#[async_trait]
pub trait BackfillStore: Send + Sync {
    /// Insert `pending` rows for keys that do not exist yet. Existing rows
    /// are untouched. Returns the number inserted.
    async fn seed_units(&self, keys: &[UnitKey]) -> StoreResult<u64>;

    /// Claimable units (`pending` or `retry`), most recent period first.
    async fn list_candidates(&self, limit: usize) -> StoreResult<Vec<BackfillUnit>>;

    /// Claim up to `limit` units in one transaction: read candidates,
    /// try-lock each, and move the locked ones to `processing` with a
    /// guarded update. With `dry_run`, only read and try-lock.
    async fn claim_batch(&self, limit: usize, dry_run: bool) -> StoreResult<ClaimOutcome>;

    async fn get_unit(&self, key: UnitKey) -> StoreResult<Option<BackfillUnit>>;

    /// `processing` -> `completed`, recording statistics.
    async fn mark_completed(&self, key: UnitKey, stats: &UnitStats) -> StoreResult<()>;

    /// `processing` -> `retry` or `failed`. Returns the new status.
    async fn mark_failed(
        &self,
        key: UnitKey,
        error: &str,
        kind: FailureKind,
        max_retries: u32,
    ) -> StoreResult<UnitStatus>;

    /// Move units stuck in `processing` longer than `older_than` to `retry`.
    async fn reclaim_stale(&self, older_than: Duration) -> StoreResult<Vec<UnitKey>>;

    /// Aggregate counts plus the `recent_failures` most recent failures.
    async fn status_summary(&self, recent_failures: usize) -> StoreResult<StatusSummary>;
}

/// Resolved-book catalog keyed by ISBN-13.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert or update by ISBN. Known values are kept where the new row
    /// has none.
    async fn upsert_book(&self, book: &CatalogBook) -> StoreResult<()>;

    async fn find_by_isbn(&self, isbn: &str) -> StoreResult<Option<CatalogBook>>;

    async fn count_books(&self) -> StoreResult<u64>;
}

/// Status after one more failure of a unit that has failed `retry_count`
/// times so far.
pub(crate) fn next_failure_state(
    retry_count: u32,
    kind: FailureKind,
    max_retries: u32,
) -> (UnitStatus, u32) {
    match kind {
        FailureKind::Transient => (UnitStatus::Retry, retry_count),
        FailureKind::Error => {
            let count = retry_count + 1;
            if count >= max_retries {
                (UnitStatus::Failed, count)
            } else {
                (UnitStatus::Retry, count)
            }
        }
    }
}
