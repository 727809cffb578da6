use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::Client;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// Shared Redis connection manager guarded by a Tokio mutex.
pub type SharedConnectionManager = Arc<Mutex<ConnectionManager>>;

/// Redis connection pool.
///
/// Request-path components (cache store, enqueue, broadcast) share one
/// multiplexed connection manager. Stream consumers that issue blocking
/// reads (`XREADGROUP ... BLOCK`) must use [`RedisPool::dedicated_connection`]
/// so they never stall the shared connection.
pub struct RedisPool {
    client: Client,
    manager: SharedConnectionManager,
}

impl RedisPool {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).context("failed to construct Redis client")?;
        let connection_manager = ConnectionManager::new(client.clone())
            .await
            .context("failed to initialize Redis connection manager")?;

        Ok(Self {
            client,
            manager: Arc::new(Mutex::new(connection_manager)),
        })
    }

    /// Shared connection manager for request-path operations.
    pub fn manager(&self) -> SharedConnectionManager {
        self.manager.clone()
    }

    /// Open a dedicated connection manager on top of the same client.
    ///
    /// Each queue worker owns one of these; blocking stream reads on it
    /// do not interfere with the shared manager.
    pub async fn dedicated_connection(&self) -> Result<ConnectionManager> {
        ConnectionManager::new(self.client.clone())
            .await
            .context("failed to open dedicated Redis connection")
    }

    /// Ping Redis to check connection health.
    ///
    /// Called periodically from a background task to surface stale
    /// connections before the request path hits them.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.lock().await;
        redis::cmd("PING")
            .query_async::<_, String>(&mut *conn)
            .await
            .map_err(|e| {
                warn!("Redis PING failed: {}", e);
                e
            })
            .context("Redis health check failed")?;
        Ok(())
    }
}

/// Normalize a comma separated list of Redis endpoints.
pub fn parse_redis_endpoints(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s.starts_with("redis://") || s.starts_with("rediss://") {
                s.to_string()
            } else {
                format!("redis://{}", s)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_endpoints_adds_scheme() {
        let endpoints = parse_redis_endpoints("localhost:6379, redis://cache:6380,");
        assert_eq!(
            endpoints,
            vec![
                "redis://localhost:6379".to_string(),
                "redis://cache:6380".to_string()
            ]
        );
    }

    #[test]
    fn parse_endpoints_empty_input() {
        assert!(parse_redis_endpoints("  ").is_empty());
    }
}
