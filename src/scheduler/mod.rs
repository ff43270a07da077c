//! Distributed backfill scheduler.
//!
//! Any number of stateless workers may run a batch at once. The store's
//! claim protocol hands each unit to exactly one of them; claimed units
//! go through a [`UnitQueue`] to a [`BackfillWorker`], which runs the
//! [`UnitProcessor`] and records completion or failure.

mod error;
mod pipeline;
mod queue;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

pub use error::{ProcessError, QueueError, SchedulerError};
pub use pipeline::{GenerationPipeline, PipelineConfig, UnitProcessor};
pub use queue::{ChannelQueue, UnitQueue};
pub use worker::{BackfillWorker, UnitOutcome, UnitReport};

use crate::models::{BackfillUnit, SeedRange, StatusSummary, UnitKey};
use crate::quota::QuotaManager;
use crate::repository::{BackfillStore, ClaimOutcome, DEFAULT_CANDIDATE_OVERFETCH};

/// Retries after which a unit is failed for good.
pub const MAX_RETRIES: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Units claimed per batch before quota scaling.
    pub batch_size: u64,
    pub max_retries: u32,
    /// Candidates read per requested claim.
    pub candidate_overfetch: usize,
    /// First month seeded (`YYYY-MM`).
    pub seed_start: String,
    /// Last month seeded; defaults to the last complete month.
    pub seed_end: Option<String>,
    /// Minutes a unit may sit in `processing` before it is reclaimed.
    pub stale_after_minutes: u64,
    /// Failures listed in status reports.
    pub recent_failures: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_retries: MAX_RETRIES,
            candidate_overfetch: DEFAULT_CANDIDATE_OVERFETCH,
            seed_start: "1900-01".to_string(),
            seed_end: None,
            stale_after_minutes: 90,
            recent_failures: 10,
        }
    }
}

impl SchedulerConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_minutes * 60)
    }

    /// The configured seed range, ending at the last complete month unless
    /// an end is set.
    pub fn seed_range(&self) -> Result<SeedRange, SchedulerError> {
        let start = UnitKey::parse(&self.seed_start)
            .ok_or_else(|| SchedulerError::InvalidRange(self.seed_start.clone()))?;
        let end = match &self.seed_end {
            Some(end) => {
                UnitKey::parse(end).ok_or_else(|| SchedulerError::InvalidRange(end.clone()))?
            }
            None => UnitKey::last_complete_month(Utc::now()),
        };
        if start > end {
            return Err(SchedulerError::InvalidRange(format!(
                "{} is after {}",
                start, end
            )));
        }
        Ok(SeedRange { start, end })
    }
}

/// Result of one claim-and-run batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub run_id: String,
    pub requested: u64,
    pub claim: ClaimOutcome,
    pub units: Vec<UnitReport>,
}

impl BatchReport {
    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Completed { .. }))
    }

    pub fn retried(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Retry { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, UnitOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&UnitOutcome) -> bool) -> usize {
        self.units.iter().filter(|u| pred(&u.outcome)).count()
    }
}

pub struct BackfillScheduler {
    store: Arc<dyn BackfillStore>,
    queue: Arc<dyn UnitQueue>,
    worker: BackfillWorker,
    quota: Option<Arc<QuotaManager>>,
    config: SchedulerConfig,
}

impl BackfillScheduler {
    pub fn new(
        store: Arc<dyn BackfillStore>,
        processor: Arc<dyn UnitProcessor>,
        config: SchedulerConfig,
    ) -> Self {
        let worker = BackfillWorker::new(Arc::clone(&store), processor, config.max_retries);
        Self {
            store,
            queue: Arc::new(ChannelQueue::new()),
            worker,
            quota: None,
            config,
        }
    }

    pub fn with_queue(mut self, queue: Arc<dyn UnitQueue>) -> Self {
        self.queue = queue;
        self
    }

    /// Scale default batch sizes by the remaining daily budget.
    pub fn with_quota(mut self, quota: Arc<QuotaManager>) -> Self {
        self.quota = Some(quota);
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Insert every unit in `range` that does not exist yet.
    pub async fn seed(&self, range: SeedRange) -> Result<u64, SchedulerError> {
        let keys = range.keys();
        let inserted = self.store.seed_units(&keys).await?;
        info!(
            "Seeded {} new unit(s) for {} to {} ({} in range)",
            inserted,
            range.start,
            range.end,
            keys.len()
        );
        Ok(inserted)
    }

    pub async fn list_candidates(&self, limit: usize) -> Result<Vec<BackfillUnit>, SchedulerError> {
        Ok(self.store.list_candidates(limit).await?)
    }

    /// Claim a batch and run every claimed unit.
    ///
    /// Without `limit`, the configured batch size is scaled by the quota
    /// left today. A dry run reports what would be claimed and runs nothing.
    pub async fn run_batch(
        &self,
        limit: Option<u64>,
        dry_run: bool,
    ) -> Result<BatchReport, SchedulerError> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("batch", run = %run_id);

        async {
            let requested = match (limit, &self.quota) {
                (Some(limit), _) => limit,
                (None, Some(quota)) => quota.get_safe_batch_size(self.config.batch_size).await,
                (None, None) => self.config.batch_size,
            };
            let mut report = BatchReport {
                run_id: run_id.clone(),
                requested,
                ..Default::default()
            };
            if requested == 0 {
                info!("Nothing to claim: batch size is zero");
                return Ok(report);
            }

            let claim = self
                .store
                .claim_batch(usize::try_from(requested).unwrap_or(usize::MAX), dry_run)
                .await?;
            info!(
                "Claimed {} unit(s), skipped {}{}",
                claim.claimed.len(),
                claim.skipped(),
                if dry_run { " (dry run)" } else { "" }
            );

            if !dry_run {
                for key in &claim.claimed {
                    self.queue.enqueue(*key).await?;
                }
                report.units = self.worker.drain(self.queue.as_ref()).await?;
            }
            report.claim = claim;
            Ok(report)
        }
        .instrument(span)
        .await
    }

    pub async fn status(&self) -> Result<StatusSummary, SchedulerError> {
        Ok(self
            .store
            .status_summary(self.config.recent_failures)
            .await?)
    }

    /// Return units stranded in `processing` to `retry`.
    pub async fn reclaim_stale(&self) -> Result<Vec<UnitKey>, SchedulerError> {
        let reclaimed = self.store.reclaim_stale(self.config.stale_after()).await?;
        if !reclaimed.is_empty() {
            info!("Reclaimed {} stale unit(s)", reclaimed.len());
        }
        Ok(reclaimed)
    }
}
