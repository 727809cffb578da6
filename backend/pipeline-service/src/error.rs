use pulse_cache::CacheError;
use pulse_events::BroadcastError;
use pulse_queue::{JobError, QueueError};
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("broadcast error: {0}")]
    Broadcast(#[from] BroadcastError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether a retry could plausibly succeed. Validation and
    /// authorization failures are deterministic and never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Cache(_)
                | AppError::Queue(_)
                | AppError::Broadcast(_)
                | AppError::Internal(_)
        )
    }

    /// HTTP-equivalent status for request-path surfaces.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::BadRequest(_) => 400,
            AppError::Forbidden => 403,
            AppError::NotFound => 404,
            _ => 500,
        }
    }
}

/// Worker-side classification: transient infrastructure errors ride the
/// queue's retry/backoff, semantic errors complete as logged no-ops.
impl From<AppError> for JobError {
    fn from(err: AppError) -> Self {
        if err.is_retryable() {
            JobError::retryable(err)
        } else {
            JobError::permanent(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semantic_errors_are_permanent() {
        assert!(!AppError::NotFound.is_retryable());
        assert!(!AppError::Forbidden.is_retryable());
        assert!(!AppError::BadRequest("empty".into()).is_retryable());
        assert!(matches!(
            JobError::from(AppError::NotFound),
            JobError::Permanent(_)
        ));
    }

    #[test]
    fn infrastructure_errors_are_retryable() {
        let err = AppError::Internal("connection reset".into());
        assert!(err.is_retryable());
        assert!(matches!(JobError::from(err), JobError::Retryable(_)));
    }

    #[test]
    fn status_codes() {
        assert_eq!(AppError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(AppError::Forbidden.status_code(), 403);
        assert_eq!(AppError::NotFound.status_code(), 404);
        assert_eq!(AppError::Internal("x".into()).status_code(), 500);
    }
}
