//! Postgres backfill store.
//!
//! Claiming runs in one transaction on one pooled connection:
//!
//! 1. read claimable candidates, most recent period first, over-fetching
//!    so contended units can be skipped;
//! 2. `pg_try_advisory_lock(year, month)` each candidate, skipping the
//!    ones another session holds;
//! 3. move each locked unit to `processing` with an update guarded on the
//!    status still being claimable, so a unit claimed between steps 1 and
//!    3 is skipped rather than claimed twice;
//! 4. commit, then release the locks on the same connection.
//!
//! Advisory locks are session-scoped and outlive the transaction. If the
//! unlock cannot be confirmed the connection is closed instead of returned
//! to the pool, which ends the session and drops its locks.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Bool, Integer, Text};
use diesel_async::{AsyncConnection, RunQueryDsl};
use tracing::{debug, warn};

use super::pool::{PgConn, PgPool};
use super::records::{unit_key, BackfillRecord, NewBackfillRecord};
use super::schema::backfill_log;
use super::{
    next_failure_state, BackfillStore, ClaimOutcome, StoreError, StoreResult,
    DEFAULT_CANDIDATE_OVERFETCH,
};
use crate::models::{
    BackfillUnit, FailureKind, FailureNote, StatusSummary, UnitKey, UnitStats, UnitStatus,
};

const SEED_CHUNK: usize = 1000;

/// Row count as a SQL `LIMIT`, saturating at `i64::MAX`.
fn sql_limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn claimable() -> [&'static str; 2] {
    [UnitStatus::Pending.as_str(), UnitStatus::Retry.as_str()]
}

#[derive(diesel::QueryableByName)]
struct LockRow {
    #[diesel(sql_type = Bool)]
    locked: bool,
}

#[derive(diesel::QueryableByName)]
struct StatusCount {
    #[diesel(sql_type = Text)]
    status: String,
    #[diesel(sql_type = BigInt)]
    count: i64,
}

#[derive(diesel::QueryableByName)]
struct Totals {
    #[diesel(sql_type = BigInt)]
    books: i64,
    #[diesel(sql_type = BigInt)]
    resolved: i64,
}

#[derive(Clone)]
pub struct DieselBackfillStore {
    pool: PgPool,
    overfetch: usize,
}

impl DieselBackfillStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            overfetch: DEFAULT_CANDIDATE_OVERFETCH,
        }
    }

    pub fn with_overfetch(mut self, overfetch: usize) -> Self {
        self.overfetch = overfetch.max(1);
        self
    }

    /// Release advisory locks taken by this session. Returns false if any
    /// release failed or reported the lock as not held.
    async fn unlock_all(conn: &mut PgConn, keys: &[UnitKey]) -> bool {
        let mut clean = true;
        for key in keys {
            let (k1, k2) = key.lock_key();
            let released: Result<LockRow, _> =
                diesel::sql_query("SELECT pg_advisory_unlock($1, $2) AS locked")
                    .bind::<Integer, _>(k1)
                    .bind::<Integer, _>(k2)
                    .get_result(conn)
                    .await;
            match released {
                Ok(row) if row.locked => {}
                Ok(_) => {
                    warn!("Advisory lock for {} was not held at release", key);
                    clean = false;
                }
                Err(e) => {
                    warn!("Failed to release advisory lock for {}: {}", key, e);
                    clean = false;
                }
            }
        }
        clean
    }

    async fn current_status(&self, conn: &mut PgConn, key: UnitKey) -> StoreResult<StoreError> {
        let status: Option<String> = backfill_log::table
            .filter(backfill_log::year.eq(key.year))
            .filter(backfill_log::month.eq(key.month as i32))
            .select(backfill_log::status)
            .first(conn)
            .await
            .optional()?;
        Ok(match status {
            Some(status) => StoreError::NotProcessing { key, status },
            None => StoreError::NotFound(key),
        })
    }
}

#[async_trait]
impl BackfillStore for DieselBackfillStore {
    async fn seed_units(&self, keys: &[UnitKey]) -> StoreResult<u64> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now();
        let mut inserted = 0u64;
        for chunk in keys.chunks(SEED_CHUNK) {
            let rows: Vec<NewBackfillRecord> = chunk
                .iter()
                .map(|k| NewBackfillRecord::pending(*k, now))
                .collect();
            let count = diesel::insert_into(backfill_log::table)
                .values(&rows)
                .on_conflict((backfill_log::year, backfill_log::month))
                .do_nothing()
                .execute(&mut conn)
                .await?;
            inserted += count as u64;
        }
        Ok(inserted)
    }

    async fn list_candidates(&self, limit: usize) -> StoreResult<Vec<BackfillUnit>> {
        let mut conn = self.pool.get().await?;
        let records: Vec<BackfillRecord> = backfill_log::table
            .filter(backfill_log::status.eq_any(claimable()))
            .order((backfill_log::year.desc(), backfill_log::month.desc()))
            .limit(sql_limit(limit))
            .select(BackfillRecord::as_select())
            .load(&mut conn)
            .await?;
        records.into_iter().map(BackfillUnit::try_from).collect()
    }

    async fn claim_batch(&self, limit: usize, dry_run: bool) -> StoreResult<ClaimOutcome> {
        if limit == 0 {
            return Ok(ClaimOutcome {
                dry_run,
                ..Default::default()
            });
        }
        let fetch = sql_limit(limit.saturating_mul(self.overfetch));
        let mut conn = self.pool.get().await?;

        let result = conn
            .transaction::<_, StoreError, _>(|conn| {
                Box::pin(async move {
                    let candidates: Vec<(i32, i32)> = backfill_log::table
                        .filter(backfill_log::status.eq_any(claimable()))
                        .order((backfill_log::year.desc(), backfill_log::month.desc()))
                        .limit(fetch)
                        .select((backfill_log::year, backfill_log::month))
                        .load(conn)
                        .await?;

                    let mut outcome = ClaimOutcome {
                        dry_run,
                        ..Default::default()
                    };
                    let mut locked = Vec::new();
                    for (year, month) in candidates {
                        if locked.len() >= limit {
                            break;
                        }
                        let key = unit_key(year, month)?;
                        let row: LockRow =
                            diesel::sql_query("SELECT pg_try_advisory_lock($1, $2) AS locked")
                                .bind::<Integer, _>(year)
                                .bind::<Integer, _>(month)
                                .get_result(conn)
                                .await?;
                        if row.locked {
                            locked.push(key);
                        } else {
                            debug!("Unit {} is locked by another session", key);
                            outcome.skipped_locked.push(key);
                        }
                    }

                    if dry_run {
                        outcome.claimed = locked.clone();
                        return Ok((outcome, locked));
                    }

                    let now = Utc::now();
                    for key in &locked {
                        let updated = diesel::update(
                            backfill_log::table
                                .filter(backfill_log::year.eq(key.year))
                                .filter(backfill_log::month.eq(key.month as i32))
                                .filter(backfill_log::status.eq_any(claimable())),
                        )
                        .set((
                            backfill_log::status.eq(UnitStatus::Processing.as_str()),
                            backfill_log::started_at.eq(Some(now)),
                        ))
                        .execute(conn)
                        .await?;
                        if updated == 1 {
                            outcome.claimed.push(*key);
                        } else {
                            debug!("Unit {} was taken before the guarded update", key);
                            outcome.skipped_taken.push(*key);
                        }
                    }
                    Ok((outcome, locked))
                })
            })
            .await;

        match result {
            Ok((outcome, locked)) => {
                if !Self::unlock_all(&mut conn, &locked).await {
                    PgPool::discard(conn);
                }
                Ok(outcome)
            }
            Err(e) => {
                // Locks taken before the failure are still held by this session.
                PgPool::discard(conn);
                Err(e)
            }
        }
    }

    async fn get_unit(&self, key: UnitKey) -> StoreResult<Option<BackfillUnit>> {
        let mut conn = self.pool.get().await?;
        let record: Option<BackfillRecord> = backfill_log::table
            .filter(backfill_log::year.eq(key.year))
            .filter(backfill_log::month.eq(key.month as i32))
            .select(BackfillRecord::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        record.map(BackfillUnit::try_from).transpose()
    }

    async fn mark_completed(&self, key: UnitKey, stats: &UnitStats) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;
        let provider_calls = serde_json::to_string(&stats.provider_calls)?;
        let updated = diesel::update(
            backfill_log::table
                .filter(backfill_log::year.eq(key.year))
                .filter(backfill_log::month.eq(key.month as i32))
                .filter(backfill_log::status.eq(UnitStatus::Processing.as_str())),
        )
        .set((
            backfill_log::status.eq(UnitStatus::Completed.as_str()),
            backfill_log::completed_at.eq(Some(Utc::now())),
            backfill_log::error_message.eq(None::<String>),
            backfill_log::books_generated.eq(Some(stats.books_generated as i32)),
            backfill_log::isbns_resolved.eq(Some(stats.isbns_resolved as i32)),
            backfill_log::provider_calls.eq(Some(provider_calls)),
            backfill_log::resolution_rate.eq(Some(stats.resolution_rate())),
        ))
        .execute(&mut conn)
        .await?;

        if updated == 1 {
            Ok(())
        } else {
            Err(self.current_status(&mut conn, key).await?)
        }
    }

    async fn mark_failed(
        &self,
        key: UnitKey,
        error: &str,
        kind: FailureKind,
        max_retries: u32,
    ) -> StoreResult<UnitStatus> {
        let mut conn = self.pool.get().await?;
        let error = error.to_string();
        conn.transaction::<_, StoreError, _>(|conn| {
            Box::pin(async move {
                let row: Option<(String, i32)> = backfill_log::table
                    .filter(backfill_log::year.eq(key.year))
                    .filter(backfill_log::month.eq(key.month as i32))
                    .select((backfill_log::status, backfill_log::retry_count))
                    .for_update()
                    .first(conn)
                    .await
                    .optional()?;
                let (status, retry_count) = row.ok_or(StoreError::NotFound(key))?;
                if status != UnitStatus::Processing.as_str() {
                    return Err(StoreError::NotProcessing { key, status });
                }

                let (next, count) =
                    next_failure_state(retry_count.max(0) as u32, kind, max_retries);
                diesel::update(
                    backfill_log::table
                        .filter(backfill_log::year.eq(key.year))
                        .filter(backfill_log::month.eq(key.month as i32)),
                )
                .set((
                    backfill_log::status.eq(next.as_str()),
                    backfill_log::retry_count.eq(count as i32),
                    backfill_log::error_message.eq(Some(error)),
                    backfill_log::last_retry_at.eq(Some(Utc::now())),
                ))
                .execute(conn)
                .await?;
                Ok(next)
            })
        })
        .await
    }

    async fn reclaim_stale(&self, older_than: Duration) -> StoreResult<Vec<UnitKey>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than)
                .map_err(|e| StoreError::InvalidRecord(e.to_string()))?;
        let mut conn = self.pool.get().await?;
        let rows: Vec<(i32, i32)> = diesel::update(
            backfill_log::table
                .filter(backfill_log::status.eq(UnitStatus::Processing.as_str()))
                .filter(
                    backfill_log::started_at
                        .lt(cutoff)
                        .or(backfill_log::started_at.is_null()),
                ),
        )
        .set((
            backfill_log::status.eq(UnitStatus::Retry.as_str()),
            backfill_log::error_message.eq(Some("reclaimed after stalling in processing")),
            backfill_log::last_retry_at.eq(Some(Utc::now())),
        ))
        .returning((backfill_log::year, backfill_log::month))
        .get_results(&mut conn)
        .await?;

        let mut keys = rows
            .into_iter()
            .map(|(y, m)| unit_key(y, m))
            .collect::<StoreResult<Vec<_>>>()?;
        keys.sort();
        Ok(keys)
    }

    async fn status_summary(&self, recent_failures: usize) -> StoreResult<StatusSummary> {
        let mut conn = self.pool.get().await?;

        let counts: Vec<StatusCount> = diesel::sql_query(
            "SELECT status, COUNT(*) AS count FROM backfill_log GROUP BY status",
        )
        .load(&mut conn)
        .await?;
        let totals: Totals = diesel::sql_query(
            "SELECT COALESCE(SUM(books_generated), 0)::BIGINT AS books, \
             COALESCE(SUM(isbns_resolved), 0)::BIGINT AS resolved FROM backfill_log",
        )
        .get_result(&mut conn)
        .await?;

        let failures: Vec<BackfillRecord> = backfill_log::table
            .filter(backfill_log::status.eq_any([
                UnitStatus::Retry.as_str(),
                UnitStatus::Failed.as_str(),
            ]))
            .filter(backfill_log::error_message.is_not_null())
            .order(backfill_log::last_retry_at.desc().nulls_last())
            .limit(sql_limit(recent_failures))
            .select(BackfillRecord::as_select())
            .load(&mut conn)
            .await?;

        let by_status: BTreeMap<String, u64> = counts
            .into_iter()
            .map(|c| (c.status, c.count.max(0) as u64))
            .collect();
        Ok(StatusSummary {
            total: by_status.values().sum(),
            by_status,
            books_generated: totals.books.max(0) as u64,
            isbns_resolved: totals.resolved.max(0) as u64,
            recent_failures: failures
                .into_iter()
                .map(FailureNote::try_from)
                .collect::<StoreResult<Vec<_>>>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_limit_never_goes_negative() {
        assert_eq!(sql_limit(0), 0);
        assert_eq!(sql_limit(25), 25);
        assert_eq!(sql_limit(usize::MAX), i64::MAX);
        assert_eq!(sql_limit(usize::MAX.saturating_mul(3)), i64::MAX);
    }
}
