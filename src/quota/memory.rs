//! In-memory key-value backend for single-process operation.
//!
//! State is not persisted across restarts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::backend::{KvError, KvResult, KvStore};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|t| Instant::now() + t),
        }
    }

    fn is_live(&self) -> bool {
        self.expires_at.is_none_or(|t| t > Instant::now())
    }
}

/// In-memory key-value backend.
#[derive(Clone, Default)]
pub struct InMemoryKvStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let entries = self.entries.lock().await;
        entries.values().filter(|e| e.is_live()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn live_value<'a>(entries: &'a HashMap<String, Entry>, key: &str) -> Option<&'a str> {
        entries
            .get(key)
            .filter(|e| e.is_live())
            .map(|e| e.value.as_str())
    }

    /// Drop expired keys. Returns how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        Self::prune(&mut entries)
    }

    fn prune(entries: &mut HashMap<String, Entry>) -> usize {
        let before = entries.len();
        entries.retain(|_, e| e.is_live());
        before - entries.len()
    }

    /// Insert, sweeping expired keys first.
    fn store(entries: &mut HashMap<String, Entry>, key: &str, entry: Entry) {
        Self::prune(entries);
        entries.insert(key.to_string(), entry);
    }

    fn add(current: i64, amount: i64) -> KvResult<i64> {
        current
            .checked_add(amount)
            .ok_or_else(|| KvError::Command("increment would overflow".to_string()))
    }

    fn parse_counter(raw: Option<&str>) -> KvResult<i64> {
        match raw {
            Some(v) => v
                .parse::<i64>()
                .map_err(|e| KvError::Command(format!("value is not an integer: {}", e))),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let entries = self.entries.lock().await;
        Ok(Self::live_value(&entries, key).map(str::to_string))
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> KvResult<()> {
        let mut entries = self.entries.lock().await;
        Self::store(&mut entries, key, Entry::new(value.to_string(), ttl));
        Ok(())
    }

    async fn incr_by(&self, key: &str, amount: i64, ttl: Option<Duration>) -> KvResult<i64> {
        let mut entries = self.entries.lock().await;
        let current = Self::parse_counter(Self::live_value(&entries, key))?;
        let next = Self::add(current, amount)?;
        Self::store(&mut entries, key, Entry::new(next.to_string(), ttl));
        Ok(next)
    }

    async fn incr_within(
        &self,
        key: &str,
        amount: i64,
        limit: i64,
        ttl: Option<Duration>,
    ) -> KvResult<Option<i64>> {
        let mut entries = self.entries.lock().await;
        let current = Self::parse_counter(Self::live_value(&entries, key))?;
        let next = match current.checked_add(amount) {
            Some(next) if next <= limit => next,
            _ => return Ok(None),
        };
        Self::store(&mut entries, key, Entry::new(next.to_string(), ttl));
        Ok(Some(next))
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Option<Duration>,
    ) -> KvResult<bool> {
        let mut entries = self.entries.lock().await;
        if Self::live_value(&entries, key) != expected {
            return Ok(false);
        }
        Self::store(&mut entries, key, Entry::new(new.to_string(), ttl));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_incr_by_starts_at_zero() {
        let store = InMemoryKvStore::new();
        assert_eq!(store.incr_by("calls", 3, None).await.unwrap(), 3);
        assert_eq!(store.incr_by("calls", 2, None).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_incr_within_refuses_over_limit() {
        let store = InMemoryKvStore::new();
        assert_eq!(store.incr_within("calls", 8, 10, None).await.unwrap(), Some(8));
        assert_eq!(store.incr_within("calls", 3, 10, None).await.unwrap(), None);
        assert_eq!(store.incr_within("calls", 2, 10, None).await.unwrap(), Some(10));
        assert_eq!(store.get("calls").await.unwrap().as_deref(), Some("10"));
    }

    #[tokio::test]
    async fn test_compare_and_swap() {
        let store = InMemoryKvStore::new();
        assert!(store.compare_and_swap("day", None, "2026-01-01", None).await.unwrap());
        assert!(!store.compare_and_swap("day", None, "2026-01-02", None).await.unwrap());
        assert!(store
            .compare_and_swap("day", Some("2026-01-01"), "2026-01-02", None)
            .await
            .unwrap());
        assert_eq!(store.get("day").await.unwrap().as_deref(), Some("2026-01-02"));
    }

    #[tokio::test]
    async fn test_expired_entries_are_absent() {
        let store = InMemoryKvStore::new();
        store
            .put("short", "v", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("short").await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_writes_remove_expired_keys() {
        let store = InMemoryKvStore::new();
        for i in 0..20 {
            store
                .put(&format!("page:{}", i), "cached", Some(Duration::from_millis(10)))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(30)).await;

        store.put("fresh", "v", None).await.unwrap();
        assert_eq!(store.entries.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_expired_counts_removed() {
        let store = InMemoryKvStore::new();
        store.put("a", "1", Some(Duration::from_millis(10))).await.unwrap();
        store.put("b", "2", Some(Duration::from_millis(10))).await.unwrap();
        store.put("kept", "3", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.cleanup_expired().await, 2);
        assert_eq!(store.entries.lock().await.len(), 1);
        assert_eq!(store.get("kept").await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_counter_overflow_is_refused() {
        let store = InMemoryKvStore::new();
        store.incr_by("calls", i64::MAX, None).await.unwrap();
        assert!(store.incr_by("calls", 1, None).await.is_err());
        assert_eq!(store.incr_within("calls", 1, i64::MAX, None).await.unwrap(), None);
        assert_eq!(
            store.get("calls").await.unwrap(),
            Some(i64::MAX.to_string())
        );
    }

    #[tokio::test]
    async fn test_non_integer_counter_is_an_error() {
        let store = InMemoryKvStore::new();
        store.put("calls", "many", None).await.unwrap();
        assert!(store.incr_by("calls", 1, None).await.is_err());
    }
}
