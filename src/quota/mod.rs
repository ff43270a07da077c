//! Daily budget tracking for the metered provider.
//!
//! The counter lives in a shared key-value store so every worker process
//! sees the same budget. Two kinds of keys are used:
//! - `{prefix}:used:{YYYY-MM-DD}`: per-day call counter (expires after 48h)
//! - `{prefix}:last_reset`: the UTC date the budget last rolled over
//!
//! Because counters are keyed by date, the rollover cannot lose or
//! double-count increments made by concurrent callers around midnight.
//!
//! Every method degrades gracefully: store failures turn into refusals or
//! a conservative status, never into errors for the caller.

mod backend;
mod config;
mod memory;

#[cfg(feature = "redis-backend")]
mod redis;

pub use backend::{get_json, put_json, KvError, KvResult, KvStore};
pub use config::{OperationKind, QuotaConfig, QuotaDecision, QuotaStatus};
pub use memory::InMemoryKvStore;

#[cfg(feature = "redis-backend")]
pub use self::redis::RedisKvStore;

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

/// Counter keys outlive their day so late readers still see the final total.
const COUNTER_TTL: Duration = Duration::from_secs(48 * 3600);

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// Gatekeeper for the metered provider's daily call budget.
#[derive(Clone)]
pub struct QuotaManager {
    store: Arc<dyn KvStore>,
    config: QuotaConfig,
    clock: Clock,
}

impl QuotaManager {
    pub fn new(store: Arc<dyn KvStore>, config: QuotaConfig) -> Self {
        Self {
            store,
            config,
            clock: Arc::new(|| Utc::now().date_naive()),
        }
    }

    /// Replace the UTC date source (used to exercise day rollover).
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    fn counter_key(&self, day: NaiveDate) -> String {
        format!("{}:used:{}", self.config.key_prefix, day.format("%Y-%m-%d"))
    }

    fn reset_key(&self) -> String {
        format!("{}:last_reset", self.config.key_prefix)
    }

    /// Advance `last_reset` to today if it is stale. Exactly one caller wins
    /// the compare-and-swap and logs the rollover.
    async fn ensure_current_day(&self) -> KvResult<NaiveDate> {
        let today = (self.clock)();
        let today_str = today.format("%Y-%m-%d").to_string();
        let reset_key = self.reset_key();

        let last = self.store.get(&reset_key).await?;
        if last.as_deref() == Some(today_str.as_str()) {
            return Ok(today);
        }

        if self
            .store
            .compare_and_swap(&reset_key, last.as_deref(), &today_str, None)
            .await?
        {
            info!(
                previous = last.as_deref().unwrap_or("never"),
                today = %today_str,
                "Daily quota reset"
            );
        }

        Ok(today)
    }

    async fn used_on(&self, day: NaiveDate) -> KvResult<u64> {
        match self.store.get(&self.counter_key(day)).await? {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|e| KvError::Serialization(format!("bad quota counter: {}", e))),
            None => Ok(0),
        }
    }

    /// Check whether `amount` calls fit in today's budget.
    ///
    /// With `reserve`, an allowed check atomically consumes the budget.
    pub async fn check_quota(&self, amount: u64, reserve: bool) -> QuotaDecision {
        match self.try_check_quota(amount, reserve).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!("Quota store unavailable, refusing {} calls: {}", amount, e);
                QuotaDecision::deny(format!("quota store unavailable: {}", e))
            }
        }
    }

    async fn try_check_quota(&self, amount: u64, reserve: bool) -> KvResult<QuotaDecision> {
        let today = self.ensure_current_day().await?;
        let limit = self.config.daily_limit;

        if reserve {
            let Ok(increment) = i64::try_from(amount) else {
                return Ok(QuotaDecision::deny(format!(
                    "{} calls exceeds the daily limit of {}",
                    amount, limit
                )));
            };
            let reserved = self
                .store
                .incr_within(
                    &self.counter_key(today),
                    increment,
                    i64::try_from(limit).unwrap_or(i64::MAX),
                    Some(COUNTER_TTL),
                )
                .await?;
            return Ok(match reserved {
                Some(used) => {
                    debug!("Reserved {} quota calls ({}/{})", amount, used, limit);
                    QuotaDecision::allow()
                }
                None => QuotaDecision::deny(format!(
                    "reserving {} calls would exceed the daily limit of {}",
                    amount, limit
                )),
            });
        }

        let used = self.used_on(today).await?;
        if used.saturating_add(amount) <= limit {
            Ok(QuotaDecision::allow())
        } else {
            Ok(QuotaDecision::deny(format!(
                "{} calls requested but only {} of {} remain today",
                amount,
                limit.saturating_sub(used),
                limit
            )))
        }
    }

    /// Reserve budget; `false` on refusal or store failure.
    pub async fn reserve_quota(&self, amount: u64) -> bool {
        self.check_quota(amount, true).await.allowed
    }

    /// Record calls that were made without a prior reservation.
    ///
    /// Amounts beyond the counter's range are clamped.
    pub async fn record_api_call(&self, amount: u64) {
        let increment = i64::try_from(amount).unwrap_or(i64::MAX);
        let result = async {
            let today = self.ensure_current_day().await?;
            self.store
                .incr_by(&self.counter_key(today), increment, Some(COUNTER_TTL))
                .await
        }
        .await;

        if let Err(e) = result {
            warn!("Failed to record {} quota calls: {}", amount, e);
        }
    }

    /// Apply operation-specific admission rules, then the raw budget check.
    ///
    /// Never reserves; callers reserve per outbound call.
    pub async fn should_allow_operation(&self, kind: OperationKind, amount: u64) -> QuotaDecision {
        match kind {
            OperationKind::BulkAuthor if amount > self.config.max_bulk_author_request => {
                return QuotaDecision::deny(format!(
                    "bulk author requests are capped at {} calls (requested {})",
                    self.config.max_bulk_author_request, amount
                ));
            }
            OperationKind::Cron => {
                let status = self.get_quota_status().await;
                if status.degraded {
                    return QuotaDecision::deny("quota store unavailable");
                }
                let buffer = amount.saturating_mul(self.config.cron_buffer_multiplier);
                if status.remaining < buffer {
                    return QuotaDecision::deny(format!(
                        "scheduled operations must leave a buffer of {} calls; {} remaining",
                        buffer, status.remaining
                    ));
                }
            }
            _ => {}
        }

        self.check_quota(amount, false).await
    }

    /// Current budget usage. Performs the daily rollover check first.
    pub async fn get_quota_status(&self) -> QuotaStatus {
        let limit = self.config.daily_limit;
        let result = async {
            let today = self.ensure_current_day().await?;
            let used = self.used_on(today).await?;
            Ok::<_, KvError>((today, used))
        }
        .await;

        match result {
            Ok((today, used)) => QuotaStatus {
                used_today: used,
                remaining: limit.saturating_sub(used),
                daily_limit: limit,
                last_reset: today,
                degraded: false,
            },
            Err(e) => {
                warn!("Quota status unavailable, reporting exhausted budget: {}", e);
                QuotaStatus {
                    used_today: limit,
                    remaining: 0,
                    daily_limit: limit,
                    last_reset: (self.clock)(),
                    degraded: true,
                }
            }
        }
    }

    /// Scale `requested_max` by the fraction of today's budget remaining.
    pub async fn get_safe_batch_size(&self, requested_max: u64) -> u64 {
        let status = self.get_quota_status().await;
        if status.remaining == 0 || status.daily_limit == 0 {
            return 0;
        }
        requested_max.saturating_mul(status.remaining) / status.daily_limit
    }
}
