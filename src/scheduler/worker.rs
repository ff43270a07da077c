//! Queue consumer that runs claimed units and records their outcome.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::error::SchedulerError;
use super::pipeline::UnitProcessor;
use super::queue::UnitQueue;
use crate::models::{FailureKind, UnitKey, UnitStats, UnitStatus};
use crate::repository::BackfillStore;

/// What happened to one delivered unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UnitOutcome {
    Completed { stats: UnitStats },
    Retry { error: String, transient: bool },
    Failed { error: String },
    /// Delivered while not `processing`: a duplicate or a unit another
    /// worker already finished.
    Duplicate { status: UnitStatus },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitReport {
    pub key: UnitKey,
    #[serde(flatten)]
    pub outcome: UnitOutcome,
}

pub struct BackfillWorker {
    store: Arc<dyn BackfillStore>,
    processor: Arc<dyn UnitProcessor>,
    max_retries: u32,
}

impl BackfillWorker {
    pub fn new(
        store: Arc<dyn BackfillStore>,
        processor: Arc<dyn UnitProcessor>,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            processor,
            max_retries,
        }
    }

    /// Process one delivered unit end to end.
    pub async fn handle(&self, key: UnitKey) -> Result<UnitReport, SchedulerError> {
        let Some(unit) = self.store.get_unit(key).await? else {
            warn!("Delivered unit {} does not exist", key);
            return Err(crate::repository::StoreError::NotFound(key).into());
        };
        if unit.status != UnitStatus::Processing {
            debug!("Skipping {} delivered while {}", key, unit.status.as_str());
            return Ok(UnitReport {
                key,
                outcome: UnitOutcome::Duplicate {
                    status: unit.status,
                },
            });
        }

        let outcome = match self.processor.process(key).await {
            Ok(stats) => {
                self.store.mark_completed(key, &stats).await?;
                info!(
                    "Completed {}: {} generated, {} resolved",
                    key, stats.books_generated, stats.isbns_resolved
                );
                UnitOutcome::Completed { stats }
            }
            Err(e) => {
                let kind = if e.is_transient() {
                    FailureKind::Transient
                } else {
                    FailureKind::Error
                };
                let error = e.to_string();
                let status = self
                    .store
                    .mark_failed(key, &error, kind, self.max_retries)
                    .await?;
                match status {
                    UnitStatus::Failed => {
                        warn!("Unit {} failed permanently: {}", key, error);
                        UnitOutcome::Failed { error }
                    }
                    _ => {
                        warn!("Unit {} will be retried: {}", key, error);
                        UnitOutcome::Retry {
                            error,
                            transient: kind == FailureKind::Transient,
                        }
                    }
                }
            }
        };
        Ok(UnitReport { key, outcome })
    }

    /// Process queued units until the queue is empty.
    pub async fn drain(&self, queue: &dyn UnitQueue) -> Result<Vec<UnitReport>, SchedulerError> {
        let mut reports = Vec::new();
        while let Some(key) = queue.dequeue().await? {
            reports.push(self.handle(key).await?);
        }
        Ok(reports)
    }
}
