//! In-memory cache store
//!
//! Same contract as the Redis store, backed by a process-local map.
//! Used by unit and integration tests, and usable as a standalone
//! backend for single-process deployments.

use crate::{CacheError, CacheOps, CacheResult};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Clone)]
struct Entry {
    data: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Process-local cache store.
#[derive(Clone, Default)]
pub struct MemoryCacheStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a key to expire immediately. Test support for exercising
    /// the read-after-expiry-is-miss invariant without sleeping.
    pub async fn force_expire(&self, key: &str) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() - Duration::from_secs(1));
        }
    }

    /// Number of live (unexpired) entries.
    pub async fn len(&self) -> usize {
        let entries = self.entries.lock().await;
        entries.values().filter(|e| !e.is_expired()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Glob match supporting `*` wildcards, the subset SCAN MATCH uses here.
fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let mut remainder = key;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match remainder.strip_prefix(part) {
                Some(rest) => remainder = rest,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return remainder.ends_with(part);
        } else {
            match remainder.find(part) {
                Some(pos) => remainder = &remainder[pos + part.len()..],
                None => return false,
            }
        }
    }

    // Pattern ended with `*`, anything left in the key is fine.
    true
}

#[async_trait::async_trait]
impl CacheOps for MemoryCacheStore {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> CacheResult<Option<T>> {
        let mut entries = self.entries.lock().await;

        let data = match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                return Ok(None);
            }
            Some(entry) => entry.data.clone(),
            None => return Ok(None),
        };

        match serde_json::from_str::<T>(&data) {
            Ok(value) => Ok(Some(value)),
            Err(_) => {
                // Corrupt entry: drop it and report a miss, matching Redis behavior
                entries.remove(key);
                Ok(None)
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
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                data,
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn set_forever<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> CacheResult<()> {
        let data = serde_json::to_string(value).map_err(CacheError::Serialization)?;
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                data,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let entries = self.entries.lock().await;
        Ok(entries.get(key).is_some_and(|e| !e.is_expired()))
    }

    async fn keys_matching(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .filter(|(k, e)| !e.is_expired() && glob_match(pattern, k))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn scan_del(&self, pattern: &str) -> CacheResult<usize> {
        let mut entries = self.entries.lock().await;
        let matched: Vec<String> = entries
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        for key in &matched {
            entries.remove(key);
        }
        Ok(matched.len())
    }

    async fn pipeline_set<T: Serialize + Send + Sync>(
        &self,
        items: &[(&str, &T, u64)],
    ) -> CacheResult<()> {
        for (key, value, ttl) in items {
            self.set(key, *value, *ttl).await?;
        }
        Ok(())
    }

    async fn pipeline_del(&self, keys: &[&str]) -> CacheResult<()> {
        let mut entries = self.entries.lock().await;
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_match_prefix_wildcard() {
        assert!(glob_match("feed:123:*", "feed:123:first:5"));
        assert!(!glob_match("feed:123:*", "feed:456:first:5"));
        assert!(glob_match("post:1", "post:1"));
        assert!(!glob_match("post:1", "post:12"));
        assert!(glob_match("*:first:*", "followers:9:first:20"));
    }

    #[tokio::test]
    async fn get_set_roundtrip() {
        let cache = MemoryCacheStore::new();
        cache.set("post:1", &"hello".to_string(), 60).await.unwrap();
        let value: Option<String> = cache.get("post:1").await.unwrap();
        assert_eq!(value, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let cache = MemoryCacheStore::new();
        cache.set("post:1", &42u32, 60).await.unwrap();
        cache.force_expire("post:1").await;

        let value: Option<u32> = cache.get("post:1").await.unwrap();
        assert!(value.is_none());
        assert!(!cache.exists("post:1").await.unwrap());
    }

    #[tokio::test]
    async fn corrupt_entry_is_a_miss_not_an_error() {
        let cache = MemoryCacheStore::new();
        cache
            .set("post:1", &"not a number".to_string(), 60)
            .await
            .unwrap();

        let value: Option<u32> = cache.get("post:1").await.unwrap();
        assert!(value.is_none());
        // The corrupt entry was dropped entirely
        assert!(!cache.exists("post:1").await.unwrap());
    }

    #[tokio::test]
    async fn set_forever_survives_until_deleted() {
        let cache = MemoryCacheStore::new();
        cache.set_forever("message:1", &"draft").await.unwrap();
        assert!(cache.exists("message:1").await.unwrap());

        cache.del("message:1").await.unwrap();
        assert!(!cache.exists("message:1").await.unwrap());
    }

    #[tokio::test]
    async fn scan_del_removes_matching_keys_only() {
        let cache = MemoryCacheStore::new();
        cache.set("feed:a:first:5", &1u32, 60).await.unwrap();
        cache.set("feed:a:first:10", &2u32, 60).await.unwrap();
        cache.set("feed:b:first:5", &3u32, 60).await.unwrap();

        let deleted = cache.scan_del("feed:a:*").await.unwrap();
        assert_eq!(deleted, 2);
        assert!(!cache.exists("feed:a:first:5").await.unwrap());
        assert!(cache.exists("feed:b:first:5").await.unwrap());
    }
}
