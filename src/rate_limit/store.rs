//! Durable counter stores backing the fixed-window rate limiter

use async_trait::async_trait;
use parking_lot::Mutex;
use redb::ReadableDatabase;
use redis::Script;
use redis::aio::ConnectionManager;
use std::time::Duration;

use crate::db::{self, Db, tables};
use crate::error::{AppError, Result};
use crate::models::RateLimitRecord;

/// Atomic increment-with-expire counter storage
#[async_trait]
pub trait CounterStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap reachability probe
    async fn ping(&self) -> Result<()>;

    /// Count one hit for `key`; the first hit of a window sets its expiry
    async fn increment(&self, key: &str, window_secs: u64, now: i64) -> Result<RateLimitRecord>;

    /// Drop windows that ended before `now`. Stores with native expiry do nothing.
    async fn prune_expired(&self, _now: i64) -> Result<usize> {
        Ok(0)
    }
}

/// Counters kept in the embedded database's `rate_limits` table
///
/// Each increment is its own write transaction; redb serializes writers, so
/// counts are exact across concurrent requests.
#[derive(Clone)]
pub struct RedbCounterStore {
    db: Db,
}

impl RedbCounterStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CounterStore for RedbCounterStore {
    fn name(&self) -> &'static str {
        "redb"
    }

    async fn ping(&self) -> Result<()> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let read_txn = db.begin_read()?;
            read_txn.open_table(tables::RATE_LIMITS)?;
            Ok(())
        })
        .await?
    }

    async fn increment(&self, key: &str, window_secs: u64, now: i64) -> Result<RateLimitRecord> {
        let db = self.db.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || -> Result<RateLimitRecord> {
            let write_txn = db.begin_write()?;
            let record = {
                let mut table = write_txn.open_table(tables::RATE_LIMITS)?;
                let mut record = db::get_record(&table, &key)?
                    .unwrap_or_else(|| RateLimitRecord::new(now, window_secs));
                record.register_hit(now, window_secs);
                db::put_record(&mut table, &key, &record)?;
                record
            };
            write_txn.commit()?;
            Ok(record)
        })
        .await?
    }

    async fn prune_expired(&self, now: i64) -> Result<usize> {
        let db = self.db.clone();

        tokio::task::spawn_blocking(move || -> Result<usize> {
            let write_txn = db.begin_write()?;
            let removed = {
                let mut table = write_txn.open_table(tables::RATE_LIMITS)?;
                let mut expired = Vec::new();
                for item in redb::ReadableTable::iter(&table)? {
                    let (key, value) = item?;
                    let record: RateLimitRecord = db::decode(value.value())?;
                    if record.is_expired(now) {
                        expired.push(key.value().to_string());
                    }
                }
                for key in &expired {
                    table.remove(key.as_str())?;
                }
                expired.len()
            };
            write_txn.commit()?;
            Ok(removed)
        })
        .await?
    }
}

/// Lua script: INCR, set the expiry on the first hit, return {count, ttl}
static FIXED_WINDOW_SCRIPT: &str = r#"
local current = redis.call('INCR', KEYS[1])
if current == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('TTL', KEYS[1])
if ttl < 0 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {current, ttl}
"#;

/// Counters kept in Redis, shared by every server instance
///
/// The connection is opened on first use and retried on every later call
/// until it succeeds, so a Redis that is down at startup is picked up once it
/// comes back. After that `ConnectionManager` handles reconnects.
pub struct RedisCounterStore {
    client: redis::Client,
    conn: Mutex<Option<ConnectionManager>>,
    script: Script,
    key_prefix: String,
    timeout: Duration,
}

impl RedisCounterStore {
    /// Parse `url` without connecting
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| AppError::UpstreamUnavailable(format!("Invalid REDIS_URL: {}", e)))?;

        Ok(Self {
            client,
            conn: Mutex::new(None),
            script: Script::new(FIXED_WINDOW_SCRIPT),
            key_prefix: "murmur:ratelimit".to_string(),
            timeout,
        })
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let cached = self.conn.lock().clone();
        if let Some(conn) = cached {
            return Ok(conn);
        }

        let conn = tokio::time::timeout(self.timeout, ConnectionManager::new(self.client.clone()))
            .await
            .map_err(|_| AppError::UpstreamUnavailable("Redis connect timed out".to_string()))?
            .map_err(|e| AppError::UpstreamUnavailable(format!("Redis connect failed: {}", e)))?;

        tracing::info!("Connected to Redis");
        *self.conn.lock() = Some(conn.clone());
        Ok(conn)
    }

    fn rate_limit_key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let pong = tokio::time::timeout(self.timeout, async {
            let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, redis::RedisError>(reply)
        })
        .await
        .map_err(|_| AppError::UpstreamUnavailable("Redis ping timed out".to_string()))?
        .map_err(|e| AppError::UpstreamUnavailable(format!("Redis ping failed: {}", e)))?;

        tracing::debug!("Redis answered {}", pong);
        Ok(())
    }

    async fn increment(&self, key: &str, window_secs: u64, now: i64) -> Result<RateLimitRecord> {
        let mut conn = self.connection().await?;
        let rate_key = self.rate_limit_key(key);

        let values: Vec<i64> = tokio::time::timeout(
            self.timeout,
            self.script
                .key(&rate_key)
                .arg(window_secs)
                .invoke_async(&mut conn),
        )
        .await
        .map_err(|_| AppError::UpstreamUnavailable("Redis increment timed out".to_string()))?
        .map_err(|e| AppError::UpstreamUnavailable(format!("Rate limit script failed: {}", e)))?;

        if values.len() != 2 {
            return Err(AppError::UpstreamUnavailable(format!(
                "Unexpected script result length: {}",
                values.len()
            )));
        }

        Ok(RateLimitRecord {
            count: values[0].max(0) as u64,
            reset_at: now + values[1],
        })
    }
}
