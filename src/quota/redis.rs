//! Redis-backed key-value store for distributed multi-process coordination.
//!
//! Conditional counter updates run as Lua scripts so they stay atomic
//! across every process sharing the Redis instance.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use super::backend::{KvError, KvResult, KvStore};

/// Key prefix for all folio data in Redis.
const KEY_PREFIX: &str = "folio:";

const INCR_WITHIN_SCRIPT: &str = r#"
    local key = KEYS[1]
    local amount = tonumber(ARGV[1])
    local limit = tonumber(ARGV[2])
    local ttl = tonumber(ARGV[3])

    local current = tonumber(redis.call('GET', key)) or 0
    if current + amount > limit then
        return -1
    end

    local next = redis.call('INCRBY', key, amount)
    if ttl > 0 then
        redis.call('EXPIRE', key, ttl)
    end
    return next
"#;

const COMPARE_AND_SWAP_SCRIPT: &str = r#"
    local key = KEYS[1]
    local has_expected = ARGV[1] == '1'
    local expected = ARGV[2]
    local new = ARGV[3]
    local ttl = tonumber(ARGV[4])

    local current = redis.call('GET', key)
    if has_expected then
        if current ~= expected then
            return 0
        end
    elseif current then
        return 0
    end

    if ttl > 0 then
        redis.call('SET', key, new, 'EX', ttl)
    else
        redis.call('SET', key, new)
    end
    return 1
"#;

/// Redis-backed key-value storage.
#[derive(Clone)]
pub struct RedisKvStore {
    conn: ConnectionManager,
}

impl RedisKvStore {
    /// Connect to Redis (e.g., "redis://localhost:6379").
    pub async fn new(redis_url: &str) -> KvResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| KvError::Unavailable(format!("Redis connection error: {}", e)))?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            KvError::Unavailable(format!("Redis connection manager error: {}", e))
        })?;

        Ok(Self { conn })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", KEY_PREFIX, key)
    }

    fn ttl_secs(ttl: Option<Duration>) -> i64 {
        ttl.map(|t| t.as_secs().max(1) as i64).unwrap_or(0)
    }
}

fn command_error(e: redis::RedisError) -> KvError {
    if e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
        KvError::Unavailable(e.to_string())
    } else {
        KvError::Command(e.to_string())
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(self.key(key)).await.map_err(command_error)
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> KvResult<()> {
        let mut conn = self.conn.clone();
        let key = self.key(key);
        match Self::ttl_secs(ttl) {
            0 => conn.set::<_, _, ()>(&key, value).await,
            secs => conn.set_ex::<_, _, ()>(&key, value, secs as u64).await,
        }
        .map_err(command_error)
    }

    async fn incr_by(&self, key: &str, amount: i64, ttl: Option<Duration>) -> KvResult<i64> {
        let mut conn = self.conn.clone();
        let key = self.key(key);
        let mut pipe = redis::pipe();
        pipe.atomic().incr(&key, amount);
        let secs = Self::ttl_secs(ttl);
        if secs > 0 {
            pipe.expire(&key, secs).ignore();
        }
        let (value,): (i64,) = pipe.query_async(&mut conn).await.map_err(command_error)?;
        Ok(value)
    }

    async fn incr_within(
        &self,
        key: &str,
        amount: i64,
        limit: i64,
        ttl: Option<Duration>,
    ) -> KvResult<Option<i64>> {
        let mut conn = self.conn.clone();
        let result: i64 = Script::new(INCR_WITHIN_SCRIPT)
            .key(self.key(key))
            .arg(amount)
            .arg(limit)
            .arg(Self::ttl_secs(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(command_error)?;

        Ok((result >= 0).then_some(result))
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Option<Duration>,
    ) -> KvResult<bool> {
        let mut conn = self.conn.clone();
        let swapped: i64 = Script::new(COMPARE_AND_SWAP_SCRIPT)
            .key(self.key(key))
            .arg(if expected.is_some() { "1" } else { "0" })
            .arg(expected.unwrap_or_default())
            .arg(new)
            .arg(Self::ttl_secs(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(command_error)?;

        Ok(swapped == 1)
    }
}
