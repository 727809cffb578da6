//! Queue and job error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed job: {0}")]
    MalformedJob(String),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Outcome classification for a failed job execution.
///
/// Retryable failures are redelivered with backoff up to the job's attempt
/// budget, then dead-lettered. Permanent failures are acknowledged as logged
/// no-ops and never retried (e.g. unauthorized delete, missing target).
#[derive(Error, Debug)]
pub enum JobError {
    #[error("retryable job failure: {0}")]
    Retryable(String),

    #[error("permanent job failure: {0}")]
    Permanent(String),
}

impl JobError {
    pub fn retryable(err: impl std::fmt::Display) -> Self {
        JobError::Retryable(err.to_string())
    }

    pub fn permanent(err: impl std::fmt::Display) -> Self {
        JobError::Permanent(err.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, JobError::Retryable(_))
    }
}
