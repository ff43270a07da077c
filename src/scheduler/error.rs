//! Scheduler error types.

use thiserror::Error;

use crate::repository::StoreError;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue is closed")]
    Closed,
    #[error("{0}")]
    Other(String),
}

/// Why processing a unit failed.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Quota refused or ran out mid-unit. The unit is retried without
    /// spending one of its retries.
    #[error("Quota exhausted: {0}")]
    QuotaExhausted(String),
    #[error("No books generated for {0}")]
    NothingGenerated(String),
    #[error("Catalog write failed: {0}")]
    Catalog(#[from] StoreError),
    #[error("{0}")]
    Other(String),
}

impl ProcessError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::QuotaExhausted(_))
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("Invalid seed range: {0}")]
    InvalidRange(String),
}
