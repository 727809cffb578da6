//! Enqueue side of the job queue

use crate::error::QueueResult;
use crate::job::{stream_key, EnqueueOptions, JobEnvelope, QueueJob};
use redis::AsyncCommands;
use redis_utils::SharedConnectionManager;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Enqueue interface handed to request-path services.
///
/// Object-safe so services can hold an `Arc<dyn JobDispatch>` and tests can
/// substitute [`MemoryJobQueue`].
#[async_trait::async_trait]
pub trait JobDispatch: Send + Sync {
    async fn enqueue_envelope(&self, envelope: &JobEnvelope) -> QueueResult<Uuid>;
}

/// Enqueue a typed job on its queue.
pub async fn enqueue<J: QueueJob>(
    dispatch: &dyn JobDispatch,
    job: &J,
    options: EnqueueOptions,
) -> QueueResult<Uuid> {
    let envelope = JobEnvelope::new(job, options)?;
    dispatch.enqueue_envelope(&envelope).await
}

/// Redis Streams-backed producer.
#[derive(Clone)]
pub struct RedisJobQueue {
    redis: SharedConnectionManager,
}

/// Keep streams bounded; consumers ack long before this horizon.
const STREAM_MAX_LEN: usize = 100_000;

impl RedisJobQueue {
    pub fn new(redis: SharedConnectionManager) -> Self {
        Self { redis }
    }

    /// Operational view of permanently failed jobs, most recent first.
    pub async fn dead_letters(&self, queue: &str, count: usize) -> QueueResult<Vec<JobEnvelope>> {
        let key = crate::job::dead_letter_key(queue);
        let mut conn = self.redis.lock().await;

        let entries: Vec<(String, Vec<(String, String)>)> = redis::cmd("XREVRANGE")
            .arg(&key)
            .arg("+")
            .arg("-")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut *conn)
            .await?;

        let mut envelopes = Vec::with_capacity(entries.len());
        for (_, fields) in entries {
            if let Some((_, raw)) = fields.iter().find(|(name, _)| name == "job") {
                if let Ok(envelope) = serde_json::from_str::<JobEnvelope>(raw) {
                    envelopes.push(envelope);
                }
            }
        }
        Ok(envelopes)
    }
}

#[async_trait::async_trait]
impl JobDispatch for RedisJobQueue {
    async fn enqueue_envelope(&self, envelope: &JobEnvelope) -> QueueResult<Uuid> {
        let key = stream_key(&envelope.queue);
        let data = serde_json::to_string(envelope)?;

        let mut conn = self.redis.lock().await;
        let entry_id: String = conn
            .xadd(&key, "*", &[("job", data.as_str())])
            .await?;

        // Approximate trim to prevent unbounded growth
        let _: Result<(), _> = redis::cmd("XTRIM")
            .arg(&key)
            .arg("MAXLEN")
            .arg("~")
            .arg(STREAM_MAX_LEN)
            .query_async(&mut *conn)
            .await;

        debug!(
            queue = %envelope.queue,
            kind = %envelope.kind,
            job_id = %envelope.id,
            entry_id = %entry_id,
            "Job enqueued"
        );
        Ok(envelope.id)
    }
}

/// In-memory producer for tests: records every envelope.
#[derive(Clone, Default)]
pub struct MemoryJobQueue {
    envelopes: Arc<Mutex<Vec<JobEnvelope>>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<JobEnvelope> {
        self.envelopes.lock().await.clone()
    }

    pub async fn jobs_for(&self, queue: &str) -> Vec<JobEnvelope> {
        self.envelopes
            .lock()
            .await
            .iter()
            .filter(|e| e.queue == queue)
            .cloned()
            .collect()
    }

    pub async fn drain(&self) -> Vec<JobEnvelope> {
        std::mem::take(&mut *self.envelopes.lock().await)
    }
}

#[async_trait::async_trait]
impl JobDispatch for MemoryJobQueue {
    async fn enqueue_envelope(&self, envelope: &JobEnvelope) -> QueueResult<Uuid> {
        self.envelopes.lock().await.push(envelope.clone());
        Ok(envelope.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct PingJob;

    impl QueueJob for PingJob {
        const QUEUE: &'static str = "pings";

        fn kind(&self) -> &'static str {
            "ping"
        }
    }

    #[tokio::test]
    async fn memory_queue_records_envelopes() {
        let queue = MemoryJobQueue::new();
        enqueue(&queue, &PingJob, EnqueueOptions::default())
            .await
            .unwrap();
        enqueue(&queue, &PingJob, EnqueueOptions::with_attempts(3, 2000))
            .await
            .unwrap();

        let jobs = queue.jobs_for("pings").await;
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].max_attempts, 1);
        assert_eq!(jobs[1].max_attempts, 3);
        assert!(queue.jobs_for("other").await.is_empty());
    }
}
