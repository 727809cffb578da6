//! Pulse unified caching layer
//!
//! Backing store for the feed/messaging pipeline:
//! - Key/value entries with per-key TTL (or none, for explicitly invalidated data)
//! - Unified key schema shared by every component
//! - SCAN-based pattern invalidation (no blocking KEYS)
//! - Pipeline support for batch operations
//! - Corrupt entries are treated as misses, never as fatal errors
//! - Metrics integration

mod error;
mod keys;
mod memory;
mod metrics;

pub use error::{CacheError, CacheResult};
pub use keys::CacheKey;
pub use memory::MemoryCacheStore;
pub use metrics::CacheMetrics;

use redis::{AsyncCommands, Pipeline};
use redis_utils::SharedConnectionManager;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

/// Default TTL values (seconds)
pub mod ttl {
    pub const FEED: u64 = 6000;
    pub const POST: u64 = 6000;
    pub const SELF_POSTS: u64 = 6000;
    pub const FOLLOW: u64 = 600;
    pub const CHAT_MESSAGES: u64 = 600;
    pub const LAST_MESSAGE: u64 = 1800;
}

/// Core cache operations trait
#[async_trait::async_trait]
pub trait CacheOps: Send + Sync {
    /// Get a value from cache. Expired or corrupt entries behave as misses.
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> CacheResult<Option<T>>;

    /// Set a value in cache with TTL
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> CacheResult<()>;

    /// Set a value with no expiry. The entry lives until explicitly deleted;
    /// used for data that is always invalidated rather than time-expired.
    async fn set_forever<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> CacheResult<()>;

    /// Delete a key from cache
    async fn del(&self, key: &str) -> CacheResult<()>;

    /// Check if key exists
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// List keys matching a glob pattern (SCAN-based, non-blocking)
    async fn keys_matching(&self, pattern: &str) -> CacheResult<Vec<String>>;

    /// Batch delete all keys matching a glob pattern, returning the count
    async fn scan_del(&self, pattern: &str) -> CacheResult<usize>;

    /// Pipeline multiple SET operations
    async fn pipeline_set<T: Serialize + Send + Sync>(
        &self,
        items: &[(&str, &T, u64)],
    ) -> CacheResult<()>;

    /// Pipeline multiple DEL operations
    async fn pipeline_del(&self, keys: &[&str]) -> CacheResult<()>;
}

/// Redis-backed cache store
#[derive(Clone)]
pub struct RedisCacheStore {
    redis: SharedConnectionManager,
    metrics: CacheMetrics,
}

impl RedisCacheStore {
    pub fn new(redis: SharedConnectionManager) -> Self {
        Self {
            redis,
            metrics: CacheMetrics::new(),
        }
    }

    /// Add jitter to TTL to prevent thundering herd
    fn add_jitter(ttl_secs: u64) -> u64 {
        let jitter_percent = (rand::random::<u32>() % 10) as f64 / 100.0;
        let jitter = (ttl_secs as f64 * jitter_percent).round() as u64;
        ttl_secs + jitter
    }
}

#[async_trait::async_trait]
impl CacheOps for RedisCacheStore {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> CacheResult<Option<T>> {
        let mut conn = self.redis.lock().await;

        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(data)) => match serde_json::from_str::<T>(&data) {
                Ok(value) => {
                    debug!(key = %key, "Cache hit");
                    self.metrics.record_hit(key);
                    Ok(Some(value))
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Cache deserialization failed");
                    self.metrics.record_error(key, "deserialize");
                    // Delete corrupted cache entry so it cannot block the read path
                    let _ = conn.del::<_, ()>(key).await;
                    Ok(None)
                }
            },
            Ok(None) => {
                debug!(key = %key, "Cache miss");
                self.metrics.record_miss(key);
                Ok(None)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Redis get error");
                self.metrics.record_error(key, "redis");
                Err(CacheError::Redis(e))
            }
        }
    }

    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> CacheResult<()> {
        let data = serde_json::to_string(value).map_err(CacheError::Serialization)?;
        let ttl_with_jitter = Self::add_jitter(ttl_secs);

        let mut conn = self.redis.lock().await;
        conn.set_ex::<_, _, ()>(key, data, ttl_with_jitter)
            .await
            .map_err(CacheError::Redis)?;

        debug!(key = %key, ttl = ttl_with_jitter, "Cache set");
        self.metrics.record_write(key);
        Ok(())
    }

    async fn set_forever<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> CacheResult<()> {
        let data = serde_json::to_string(value).map_err(CacheError::Serialization)?;

        let mut conn = self.redis.lock().await;
        conn.set::<_, _, ()>(key, data)
            .await
            .map_err(CacheError::Redis)?;

        debug!(key = %key, "Cache set (no expiry)");
        self.metrics.record_write(key);
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.redis.lock().await;
        conn.del::<_, ()>(key).await.map_err(CacheError::Redis)?;

        debug!(key = %key, "Cache delete");
        self.metrics.record_invalidation(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.redis.lock().await;
        let exists: bool = conn.exists(key).await.map_err(CacheError::Redis)?;
        Ok(exists)
    }

    async fn keys_matching(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let mut conn = self.redis.lock().await;
        let mut cursor: u64 = 0;
        let mut matched = Vec::new();

        loop {
            // Use SCAN instead of KEYS to avoid blocking
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut *conn)
                .await
                .map_err(CacheError::Redis)?;

            matched.extend(keys);
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(matched)
    }

    async fn scan_del(&self, pattern: &str) -> CacheResult<usize> {
        let mut conn = self.redis.lock().await;
        let mut cursor: u64 = 0;
        let mut total_deleted = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut *conn)
                .await
                .map_err(CacheError::Redis)?;

            if !keys.is_empty() {
                let mut pipe = Pipeline::new();
                for key in &keys {
                    pipe.del(key);
                }
                pipe.query_async::<_, ()>(&mut *conn)
                    .await
                    .map_err(CacheError::Redis)?;

                total_deleted += keys.len();
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        debug!(pattern = %pattern, deleted = total_deleted, "Cache scan delete");
        Ok(total_deleted)
    }

    async fn pipeline_set<T: Serialize + Send + Sync>(
        &self,
        items: &[(&str, &T, u64)],
    ) -> CacheResult<()> {
        if items.is_empty() {
            return Ok(());
        }

        let mut conn = self.redis.lock().await;
        let mut pipe = Pipeline::new();

        for (key, value, ttl) in items {
            let data = serde_json::to_string(value).map_err(CacheError::Serialization)?;
            let ttl_with_jitter = Self::add_jitter(*ttl);
            pipe.set_ex(*key, data, ttl_with_jitter);
        }

        pipe.query_async::<_, ()>(&mut *conn)
            .await
            .map_err(CacheError::Redis)?;

        debug!(count = items.len(), "Cache pipeline set");
        Ok(())
    }

    async fn pipeline_del(&self, keys: &[&str]) -> CacheResult<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = self.redis.lock().await;
        let mut pipe = Pipeline::new();

        for key in keys {
            pipe.del(*key);
        }

        pipe.query_async::<_, ()>(&mut *conn)
            .await
            .map_err(CacheError::Redis)?;

        debug!(count = keys.len(), "Cache pipeline delete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_jitter_stays_within_ten_percent() {
        let ttl = 300u64;
        let with_jitter = RedisCacheStore::add_jitter(ttl);
        assert!(with_jitter >= ttl);
        assert!(with_jitter <= ttl + (ttl / 10));
    }
}
