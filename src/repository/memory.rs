//! In-memory stores for tests and single-process runs.
//!
//! The backfill store walks the same steps as the Postgres claim
//! transaction (candidate read, try-lock, guarded update, unlock) and
//! yields between them, so concurrent claimers interleave the way
//! separate database sessions do.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{
    next_failure_state, BackfillStore, CatalogStore, ClaimOutcome, StoreError, StoreResult,
    DEFAULT_CANDIDATE_OVERFETCH,
};
use crate::models::{
    BackfillUnit, CatalogBook, FailureKind, FailureNote, StatusSummary, UnitKey, UnitStats,
    UnitStatus,
};

#[derive(Clone)]
pub struct InMemoryBackfillStore {
    units: Arc<Mutex<BTreeMap<UnitKey, BackfillUnit>>>,
    locks: Arc<Mutex<HashSet<UnitKey>>>,
    overfetch: usize,
}

impl Default for InMemoryBackfillStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackfillStore {
    pub fn new() -> Self {
        Self {
            units: Arc::new(Mutex::new(BTreeMap::new())),
            locks: Arc::new(Mutex::new(HashSet::new())),
            overfetch: DEFAULT_CANDIDATE_OVERFETCH,
        }
    }

    pub fn with_overfetch(mut self, overfetch: usize) -> Self {
        self.overfetch = overfetch.max(1);
        self
    }

    /// Take the advisory lock for `key` as if another session held it.
    /// Returns false if it is already held.
    pub async fn hold_lock(&self, key: UnitKey) -> bool {
        self.locks.lock().await.insert(key)
    }

    pub async fn release_lock(&self, key: UnitKey) -> bool {
        self.locks.lock().await.remove(&key)
    }

    /// Overwrite a unit wholesale.
    pub async fn put_unit(&self, unit: BackfillUnit) {
        self.units.lock().await.insert(unit.key, unit);
    }

    fn candidate_order(units: &BTreeMap<UnitKey, BackfillUnit>, limit: usize) -> Vec<BackfillUnit> {
        units
            .values()
            .rev()
            .filter(|u| u.status.is_claimable())
            .take(limit)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl BackfillStore for InMemoryBackfillStore {
    async fn seed_units(&self, keys: &[UnitKey]) -> StoreResult<u64> {
        let mut units = self.units.lock().await;
        let mut inserted = 0;
        for key in keys {
            if !units.contains_key(key) {
                units.insert(*key, BackfillUnit::pending(*key));
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn list_candidates(&self, limit: usize) -> StoreResult<Vec<BackfillUnit>> {
        let units = self.units.lock().await;
        Ok(Self::candidate_order(&units, limit))
    }

    async fn claim_batch(&self, limit: usize, dry_run: bool) -> StoreResult<ClaimOutcome> {
        let mut outcome = ClaimOutcome {
            dry_run,
            ..Default::default()
        };
        if limit == 0 {
            return Ok(outcome);
        }

        let candidates = {
            let units = self.units.lock().await;
            Self::candidate_order(&units, limit.saturating_mul(self.overfetch))
        };
        tokio::task::yield_now().await;

        let mut locked = Vec::new();
        for unit in candidates {
            if locked.len() >= limit {
                break;
            }
            if self.locks.lock().await.insert(unit.key) {
                locked.push(unit.key);
            } else {
                outcome.skipped_locked.push(unit.key);
            }
            tokio::task::yield_now().await;
        }

        if dry_run {
            outcome.claimed = locked.clone();
        } else {
            let now = Utc::now();
            let mut units = self.units.lock().await;
            for key in &locked {
                match units.get_mut(key) {
                    Some(unit) if unit.status.is_claimable() => {
                        unit.status = UnitStatus::Processing;
                        unit.started_at = Some(now);
                        outcome.claimed.push(*key);
                    }
                    _ => outcome.skipped_taken.push(*key),
                }
            }
        }

        let mut locks = self.locks.lock().await;
        for key in &locked {
            locks.remove(key);
        }
        Ok(outcome)
    }

    async fn get_unit(&self, key: UnitKey) -> StoreResult<Option<BackfillUnit>> {
        Ok(self.units.lock().await.get(&key).cloned())
    }

    async fn mark_completed(&self, key: UnitKey, stats: &UnitStats) -> StoreResult<()> {
        let mut units = self.units.lock().await;
        let unit = units.get_mut(&key).ok_or(StoreError::NotFound(key))?;
        if unit.status != UnitStatus::Processing {
            return Err(StoreError::NotProcessing {
                key,
                status: unit.status.as_str().to_string(),
            });
        }
        unit.status = UnitStatus::Completed;
        unit.completed_at = Some(Utc::now());
        unit.error_message = None;
        unit.resolution_rate = Some(stats.resolution_rate());
        unit.stats = Some(stats.clone());
        Ok(())
    }

    async fn mark_failed(
        &self,
        key: UnitKey,
        error: &str,
        kind: FailureKind,
        max_retries: u32,
    ) -> StoreResult<UnitStatus> {
        let mut units = self.units.lock().await;
        let unit = units.get_mut(&key).ok_or(StoreError::NotFound(key))?;
        if unit.status != UnitStatus::Processing {
            return Err(StoreError::NotProcessing {
                key,
                status: unit.status.as_str().to_string(),
            });
        }
        let (status, retry_count) = next_failure_state(unit.retry_count, kind, max_retries);
        unit.status = status;
        unit.retry_count = retry_count;
        unit.error_message = Some(error.to_string());
        unit.last_retry_at = Some(Utc::now());
        Ok(status)
    }

    async fn reclaim_stale(&self, older_than: Duration) -> StoreResult<Vec<UnitKey>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than)
                .map_err(|e| StoreError::InvalidRecord(e.to_string()))?;
        let mut units = self.units.lock().await;
        let mut reclaimed = Vec::new();
        for unit in units.values_mut() {
            let stale = unit.status == UnitStatus::Processing
                && unit.started_at.map_or(true, |started| started < cutoff);
            if stale {
                unit.status = UnitStatus::Retry;
                unit.error_message = Some("reclaimed after stalling in processing".to_string());
                unit.last_retry_at = Some(Utc::now());
                reclaimed.push(unit.key);
            }
        }
        Ok(reclaimed)
    }

    async fn status_summary(&self, recent_failures: usize) -> StoreResult<StatusSummary> {
        let units = self.units.lock().await;
        let mut summary = StatusSummary {
            total: units.len() as u64,
            ..Default::default()
        };
        for unit in units.values() {
            *summary
                .by_status
                .entry(unit.status.as_str().to_string())
                .or_insert(0) += 1;
            if let Some(stats) = &unit.stats {
                summary.books_generated += stats.books_generated as u64;
                summary.isbns_resolved += stats.isbns_resolved as u64;
            }
        }

        let mut failures: Vec<&BackfillUnit> = units
            .values()
            .filter(|u| {
                matches!(u.status, UnitStatus::Retry | UnitStatus::Failed)
                    && u.error_message.is_some()
            })
            .collect();
        failures.sort_by(|a, b| b.last_retry_at.cmp(&a.last_retry_at));
        summary.recent_failures = failures
            .into_iter()
            .take(recent_failures)
            .map(|u| FailureNote {
                key: u.key,
                status: u.status,
                retry_count: u.retry_count,
                error_message: u.error_message.clone(),
                last_retry_at: u.last_retry_at,
            })
            .collect();
        Ok(summary)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryCatalogStore {
    books: Arc<Mutex<HashMap<String, CatalogBook>>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn upsert_book(&self, book: &CatalogBook) -> StoreResult<()> {
        let mut books = self.books.lock().await;
        match books.get_mut(&book.isbn) {
            Some(existing) => existing.merge_from(book),
            None => {
                books.insert(book.isbn.clone(), book.clone());
            }
        }
        Ok(())
    }

    async fn find_by_isbn(&self, isbn: &str) -> StoreResult<Option<CatalogBook>> {
        Ok(self.books.lock().await.get(isbn).cloned())
    }

    async fn count_books(&self) -> StoreResult<u64> {
        Ok(self.books.lock().await.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(year: i32, month: u32) -> UnitKey {
        UnitKey::new(year, month).unwrap()
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let store = InMemoryBackfillStore::new();
        let keys = [key(2020, 1), key(2020, 2)];
        assert_eq!(store.seed_units(&keys).await.unwrap(), 2);
        assert_eq!(store.seed_units(&keys).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_candidates_most_recent_first() {
        let store = InMemoryBackfillStore::new();
        store
            .seed_units(&[key(2019, 12), key(2020, 3), key(2020, 1)])
            .await
            .unwrap();
        let candidates = store.list_candidates(10).await.unwrap();
        let keys: Vec<_> = candidates.iter().map(|u| u.key).collect();
        assert_eq!(keys, vec![key(2020, 3), key(2020, 1), key(2019, 12)]);
    }

    #[tokio::test]
    async fn test_locked_unit_is_skipped() {
        let store = InMemoryBackfillStore::new();
        store.seed_units(&[key(2020, 1), key(2020, 2)]).await.unwrap();
        assert!(store.hold_lock(key(2020, 2)).await);

        let outcome = store.claim_batch(1, false).await.unwrap();
        assert_eq!(outcome.claimed, vec![key(2020, 1)]);
        assert_eq!(outcome.skipped_locked, vec![key(2020, 2)]);

        let unit = store.get_unit(key(2020, 2)).await.unwrap().unwrap();
        assert_eq!(unit.status, UnitStatus::Pending);
    }

    #[tokio::test]
    async fn test_dry_run_changes_nothing() {
        let store = InMemoryBackfillStore::new();
        store.seed_units(&[key(2020, 1)]).await.unwrap();
        let outcome = store.claim_batch(5, true).await.unwrap();
        assert!(outcome.dry_run);
        assert_eq!(outcome.claimed, vec![key(2020, 1)]);
        let unit = store.get_unit(key(2020, 1)).await.unwrap().unwrap();
        assert_eq!(unit.status, UnitStatus::Pending);
        // Locks taken during the dry run are released.
        assert!(store.hold_lock(key(2020, 1)).await);
    }

    #[tokio::test]
    async fn test_complete_requires_processing() {
        let store = InMemoryBackfillStore::new();
        store.seed_units(&[key(2020, 1)]).await.unwrap();
        let err = store
            .mark_completed(key(2020, 1), &UnitStats::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotProcessing { .. }));
    }

    #[tokio::test]
    async fn test_reclaim_stale() {
        let store = InMemoryBackfillStore::new();
        let mut unit = BackfillUnit::pending(key(2020, 1));
        unit.status = UnitStatus::Processing;
        unit.started_at = Some(Utc::now() - chrono::Duration::hours(3));
        store.put_unit(unit).await;
        let mut fresh = BackfillUnit::pending(key(2020, 2));
        fresh.status = UnitStatus::Processing;
        fresh.started_at = Some(Utc::now());
        store.put_unit(fresh).await;

        let reclaimed = store
            .reclaim_stale(Duration::from_secs(90 * 60))
            .await
            .unwrap();
        assert_eq!(reclaimed, vec![key(2020, 1)]);
        let unit = store.get_unit(key(2020, 1)).await.unwrap().unwrap();
        assert_eq!(unit.status, UnitStatus::Retry);
        assert_eq!(unit.retry_count, 0);
    }

    #[tokio::test]
    async fn test_catalog_upsert_keeps_known_values() {
        let store = InMemoryCatalogStore::new();
        let mut book = CatalogBook::new("9780441013593", "Dune");
        book.publisher = Some("Ace".to_string());
        store.upsert_book(&book).await.unwrap();

        let mut update = CatalogBook::new("9780441013593", "Dune");
        update.description = Some("Desert planet".to_string());
        store.upsert_book(&update).await.unwrap();

        let stored = store.find_by_isbn("9780441013593").await.unwrap().unwrap();
        assert_eq!(stored.publisher.as_deref(), Some("Ace"));
        assert_eq!(stored.description.as_deref(), Some("Desert planet"));
        assert_eq!(store.count_books().await.unwrap(), 1);
    }
}
