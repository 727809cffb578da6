//! Job envelope and enqueue options

use crate::error::{QueueError, QueueResult};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

/// Backoff policy applied between redeliveries of a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Backoff {
    /// `delay = base * 2^(attempt - 1)`
    Exponential {
        #[serde(rename = "delay")]
        base_delay_ms: u64,
    },
}

impl Backoff {
    /// Delay before the redelivery that follows the given (1-based) attempt.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        match self {
            Backoff::Exponential { base_delay_ms } => {
                // Cap the shift so a pathological attempt count cannot overflow
                let exp = attempt.saturating_sub(1).min(20);
                base_delay_ms.saturating_mul(1u64 << exp)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Exponential {
            base_delay_ms: 1000,
        }
    }
}

/// Per-job delivery options.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EnqueueOptions {
    /// Total delivery attempts before the job is dead-lettered.
    pub attempts: u32,
    pub backoff: Backoff,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            attempts: 1,
            backoff: Backoff::default(),
        }
    }
}

impl EnqueueOptions {
    pub fn with_attempts(attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            attempts,
            backoff: Backoff::Exponential { base_delay_ms },
        }
    }
}

/// Ties a payload type to its queue name and job kind.
pub trait QueueJob: Serialize + DeserializeOwned + Send + Sync {
    const QUEUE: &'static str;

    fn kind(&self) -> &'static str;
}

/// The unit carried on a queue stream.
///
/// Envelopes are self-describing: the retry scheduler and the dead-letter
/// view only need the envelope, never the typed payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub id: Uuid,
    pub queue: String,
    pub kind: String,
    pub payload: serde_json::Value,
    /// 1-based delivery attempt this envelope represents.
    pub attempt: u32,
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub enqueued_at: DateTime<Utc>,
}

impl JobEnvelope {
    pub fn new<J: QueueJob>(job: &J, options: EnqueueOptions) -> QueueResult<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            queue: J::QUEUE.to_string(),
            kind: job.kind().to_string(),
            payload: serde_json::to_value(job)?,
            attempt: 1,
            max_attempts: options.attempts.max(1),
            backoff: options.backoff,
            enqueued_at: Utc::now(),
        })
    }

    /// Decode the typed payload. A mismatch fails fast at the boundary
    /// instead of propagating partial data into business logic.
    pub fn decode<J: QueueJob>(&self) -> QueueResult<J> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| QueueError::MalformedJob(format!("{} ({})", e, self.kind)))
    }

    pub fn attempts_remaining(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Delay before this envelope's redelivery.
    pub fn retry_delay_ms(&self) -> u64 {
        self.backoff.delay_ms(self.attempt)
    }

    /// The envelope to re-enqueue after a retryable failure.
    pub fn next_attempt(mut self) -> Self {
        self.attempt += 1;
        self
    }
}

/// Stream key for a queue.
pub fn stream_key(queue: &str) -> String {
    format!("queue:{}", queue)
}

/// ZSET holding envelopes scheduled for delayed redelivery.
pub fn retry_key(queue: &str) -> String {
    format!("queue:{}:retry", queue)
}

/// Stream holding permanently failed jobs for operational inspection.
pub fn dead_letter_key(queue: &str) -> String {
    format!("queue:{}:dead", queue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestJob {
        value: u32,
    }

    impl QueueJob for TestJob {
        const QUEUE: &'static str = "test";

        fn kind(&self) -> &'static str {
            "test-job"
        }
    }

    #[test]
    fn exponential_backoff_doubles_per_attempt() {
        let backoff = Backoff::Exponential {
            base_delay_ms: 2000,
        };
        assert_eq!(backoff.delay_ms(1), 2000);
        assert_eq!(backoff.delay_ms(2), 4000);
        assert_eq!(backoff.delay_ms(3), 8000);
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let backoff = Backoff::Exponential {
            base_delay_ms: u64::MAX / 2,
        };
        // Must not panic on overflow
        let _ = backoff.delay_ms(64);
    }

    #[test]
    fn backoff_wire_shape_matches_convention() {
        let backoff = Backoff::Exponential {
            base_delay_ms: 2000,
        };
        let json = serde_json::to_value(backoff).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "exponential", "delay": 2000})
        );
    }

    #[test]
    fn envelope_roundtrip() {
        let job = TestJob { value: 7 };
        let envelope =
            JobEnvelope::new(&job, EnqueueOptions::with_attempts(3, 2000)).unwrap();

        assert_eq!(envelope.queue, "test");
        assert_eq!(envelope.kind, "test-job");
        assert_eq!(envelope.attempt, 1);
        assert_eq!(envelope.max_attempts, 3);
        assert!(envelope.attempts_remaining());
        assert_eq!(envelope.decode::<TestJob>().unwrap(), TestJob { value: 7 });
    }

    #[test]
    fn envelope_retry_progression() {
        let job = TestJob { value: 1 };
        let envelope =
            JobEnvelope::new(&job, EnqueueOptions::with_attempts(2, 1000)).unwrap();

        assert_eq!(envelope.retry_delay_ms(), 1000);
        let second = envelope.next_attempt();
        assert_eq!(second.attempt, 2);
        assert!(!second.attempts_remaining());
        assert_eq!(second.retry_delay_ms(), 2000);
    }

    #[test]
    fn malformed_payload_fails_fast() {
        let job = TestJob { value: 1 };
        let mut envelope = JobEnvelope::new(&job, EnqueueOptions::default()).unwrap();
        envelope.payload = serde_json::json!({"unexpected": true});

        assert!(envelope.decode::<TestJob>().is_err());
    }

    #[test]
    fn queue_key_formats() {
        assert_eq!(stream_key("posts"), "queue:posts");
        assert_eq!(retry_key("posts"), "queue:posts:retry");
        assert_eq!(dead_letter_key("posts"), "queue:posts:dead");
    }
}
