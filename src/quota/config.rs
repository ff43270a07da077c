//! Quota manager configuration and types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Configuration for the metered provider's daily budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Calls allowed per UTC day.
    pub daily_limit: u64,
    /// Scheduled operations must leave `multiplier * amount` remaining.
    pub cron_buffer_multiplier: u64,
    /// Largest single request a bulk-author operation may make.
    pub max_bulk_author_request: u64,
    /// Key namespace in the key-value store.
    pub key_prefix: String,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_limit: 15_000,
            cron_buffer_multiplier: 2,
            max_bulk_author_request: 100,
            key_prefix: "quota:isbndb".to_string(),
        }
    }
}

/// Kind of operation asking for budget, used for admission rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Cron-triggered or scheduler-driven work.
    Cron,
    /// Bulk author bibliography import.
    BulkAuthor,
    /// Batch enrichment requested by an operator.
    Batch,
    /// A single interactive lookup.
    Single,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cron => "cron",
            Self::BulkAuthor => "bulk_author",
            Self::Batch => "batch",
            Self::Single => "single",
        }
    }
}

/// Admission decision with a human-readable refusal reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl QuotaDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Point-in-time view of the daily budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    pub used_today: u64,
    pub remaining: u64,
    pub daily_limit: u64,
    pub last_reset: NaiveDate,
    /// True when the store could not be read and this is a fallback value.
    pub degraded: bool,
}
