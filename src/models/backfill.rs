//! Backfill work-unit models.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a backfill unit: one calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitKey {
    pub year: i32,
    pub month: u32,
}

impl UnitKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// The two integers used as the advisory lock key.
    pub fn lock_key(&self) -> (i32, i32) {
        (self.year, self.month as i32)
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// The most recent fully elapsed month relative to `now`.
    pub fn last_complete_month(now: DateTime<Utc>) -> Self {
        let current = Self {
            year: now.year(),
            month: now.month(),
        };
        if current.month == 1 {
            Self {
                year: current.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: current.year,
                month: current.month - 1,
            }
        }
    }

    /// Parse `YYYY-MM`.
    pub fn parse(s: &str) -> Option<Self> {
        let (year, month) = s.trim().split_once('-')?;
        Self::new(year.parse().ok()?, month.parse().ok()?)
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Lifecycle state of a backfill unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Retry,
}

impl UnitStatus {
    /// States eligible for claiming.
    pub const CLAIMABLE: [UnitStatus; 2] = [UnitStatus::Pending, UnitStatus::Retry];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Retry => "retry",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "retry" => Some(Self::Retry),
            _ => None,
        }
    }

    pub fn is_claimable(&self) -> bool {
        Self::CLAIMABLE.contains(self)
    }
}

/// Summary statistics recorded when a unit completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitStats {
    pub books_generated: u32,
    pub isbns_resolved: u32,
    /// Provider name -> number of outbound calls made while processing.
    pub provider_calls: BTreeMap<String, u32>,
}

impl UnitStats {
    /// Resolved / generated, or 0 when nothing was generated.
    pub fn resolution_rate(&self) -> f64 {
        if self.books_generated == 0 {
            0.0
        } else {
            self.isbns_resolved as f64 / self.books_generated as f64
        }
    }
}

/// A persisted backfill unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackfillUnit {
    pub key: UnitKey,
    pub status: UnitStatus,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub stats: Option<UnitStats>,
    pub resolution_rate: Option<f64>,
}

impl BackfillUnit {
    pub fn pending(key: UnitKey) -> Self {
        Self {
            key,
            status: UnitStatus::Pending,
            retry_count: 0,
            error_message: None,
            started_at: None,
            completed_at: None,
            last_retry_at: None,
            stats: None,
            resolution_rate: None,
        }
    }
}

/// Inclusive range of months to seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedRange {
    pub start: UnitKey,
    pub end: UnitKey,
}

impl SeedRange {
    pub fn keys(&self) -> Vec<UnitKey> {
        let mut keys = Vec::new();
        let mut current = self.start;
        while current <= self.end {
            keys.push(current);
            current = current.next();
        }
        keys
    }
}

/// How a failed unit was transitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Counts toward the retry cap.
    Error,
    /// Transient (quota exhaustion); rescheduled without consuming a retry.
    Transient,
}

/// A recently failed unit, for status reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureNote {
    pub key: UnitKey,
    pub status: UnitStatus,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub last_retry_at: Option<DateTime<Utc>>,
}

/// Aggregate state of the whole backfill.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
    pub books_generated: u64,
    pub isbns_resolved: u64,
    pub recent_failures: Vec<FailureNote>,
}

impl StatusSummary {
    pub fn count(&self, status: UnitStatus) -> u64 {
        self.by_status.get(status.as_str()).copied().unwrap_or(0)
    }

    pub fn percent_complete(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.count(UnitStatus::Completed) as f64 * 100.0 / self.total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_unit_key_validation() {
        assert!(UnitKey::new(2020, 0).is_none());
        assert!(UnitKey::new(2020, 13).is_none());
        assert_eq!(UnitKey::parse("2019-07"), UnitKey::new(2019, 7));
        assert_eq!(UnitKey::parse("2019-7x"), None);
    }

    #[test]
    fn test_seed_range_crosses_year() {
        let range = SeedRange {
            start: UnitKey::new(2019, 11).unwrap(),
            end: UnitKey::new(2020, 2).unwrap(),
        };
        let keys: Vec<String> = range.keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["2019-11", "2019-12", "2020-01", "2020-02"]);
    }

    #[test]
    fn test_last_complete_month_wraps_january() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap();
        assert_eq!(UnitKey::last_complete_month(now), UnitKey::new(2025, 12).unwrap());
    }

    #[test]
    fn test_resolution_rate() {
        let stats = UnitStats {
            books_generated: 8,
            isbns_resolved: 6,
            provider_calls: BTreeMap::new(),
        };
        assert!((stats.resolution_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(UnitStats::default().resolution_rate(), 0.0);
    }
}
