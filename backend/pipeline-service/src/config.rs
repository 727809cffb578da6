use crate::error::{AppError, AppResult};
use redis_utils::parse_redis_endpoints;

/// Runtime configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,

    /// Default feed page size; callers may override per request.
    pub feed_page_size: u32,
    /// Default follower/following page size.
    pub follow_page_size: u32,
    /// Number of messages in a chat's cached first page.
    pub message_page_size: u32,

    /// Jobs pulled per queue read.
    pub worker_concurrency: usize,
    /// Delivery attempts for message persistence jobs.
    pub message_attempts: u32,
    /// Base delay for the exponential backoff on message jobs.
    pub message_backoff_ms: u64,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: require("DATABASE_URL")?,
            redis_url: std::env::var("REDIS_URL")
                .ok()
                .and_then(|raw| parse_redis_endpoints(&raw).into_iter().next())
                .unwrap_or_else(|| "redis://localhost:6379".to_string()),
            feed_page_size: parse_or("FEED_PAGE_SIZE", 10)?,
            follow_page_size: parse_or("FOLLOW_PAGE_SIZE", 20)?,
            message_page_size: parse_or("MESSAGE_PAGE_SIZE", 30)?,
            worker_concurrency: parse_or("WORKER_CONCURRENCY", 2)?,
            message_attempts: parse_or("MESSAGE_ATTEMPTS", 3)?,
            message_backoff_ms: parse_or("MESSAGE_BACKOFF_MS", 2000)?,
        })
    }

    #[cfg(test)]
    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/pulse_test".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
            feed_page_size: 10,
            follow_page_size: 20,
            message_page_size: 30,
            worker_concurrency: 2,
            message_attempts: 3,
            message_backoff_ms: 2000,
        }
    }
}

fn require(name: &str) -> AppResult<String> {
    std::env::var(name).map_err(|_| AppError::Config(format!("{name} must be set")))
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> AppResult<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("{name} is not a valid value: {raw}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_consistent() {
        let config = Config::test_defaults();
        assert_eq!(config.feed_page_size, 10);
        assert_eq!(config.message_attempts, 3);
        assert_eq!(config.message_backoff_ms, 2000);
    }
}
