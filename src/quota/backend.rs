//! Pluggable key-value backend for quota counters and response caches.
//!
//! Allows swapping between in-memory (single process) and Redis
//! (distributed). Counter mutations must be atomic within the backend;
//! callers never hold an external lock.

use std::time::Duration;

use async_trait::async_trait;

/// Result type for key-value operations.
pub type KvResult<T> = Result<T, KvError>;

/// Errors from key-value backend operations.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Command failed: {0}")]
    Command(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for KvError {
    fn from(e: serde_json::Error) -> Self {
        KvError::Serialization(e.to_string())
    }
}

/// Trait for key-value storage backends.
///
/// Implementations must be thread-safe and handle concurrent access.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a raw value.
    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    /// Write a raw value, optionally expiring after `ttl`.
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> KvResult<()>;

    /// Atomically add `amount` to an integer counter (missing = 0).
    /// Returns the new value.
    async fn incr_by(&self, key: &str, amount: i64, ttl: Option<Duration>) -> KvResult<i64>;

    /// Atomically add `amount` only if the result stays within `limit`.
    /// Returns the new value on success, `None` if the limit would be exceeded.
    async fn incr_within(
        &self,
        key: &str,
        amount: i64,
        limit: i64,
        ttl: Option<Duration>,
    ) -> KvResult<Option<i64>>;

    /// Atomically replace the value if it currently equals `expected`
    /// (`None` meaning absent). Returns whether the swap happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Option<Duration>,
    ) -> KvResult<bool>;
}

/// Read and deserialize a JSON value.
pub async fn get_json<T: serde::de::DeserializeOwned>(
    store: &dyn KvStore,
    key: &str,
) -> KvResult<Option<T>> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serialize and write a JSON value.
pub async fn put_json<T: serde::Serialize>(
    store: &dyn KvStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> KvResult<()> {
    let raw = serde_json::to_string(value)?;
    store.put(key, &raw, ttl).await
}
