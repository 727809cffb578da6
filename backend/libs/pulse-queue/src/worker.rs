//! Stream consumer and retry scheduler
//!
//! Each worker owns one logical queue: it reads batches through a consumer
//! group on a dedicated connection, runs the handler at the configured
//! concurrency, and resolves each job as completed, retried with backoff,
//! or dead-lettered. Delivery is at-least-once; handlers must tolerate
//! redelivery.

use crate::error::{JobError, QueueResult};
use crate::job::{dead_letter_key, retry_key, stream_key, JobEnvelope};
use crate::metrics::QueueMetrics;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A single-job-kind consumer. States per job:
/// received → processing → (completed | failed→retry | failed→dead).
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync {
    /// The queue this handler consumes.
    fn queue(&self) -> &'static str;

    async fn handle(&self, job: &JobEnvelope) -> Result<(), JobError>;
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Consumer group name; one group per logical queue.
    pub group: String,
    /// Consumer name (instance ID).
    pub consumer: String,
    /// In-process parallel job executions. Kept low (1-2) to bound
    /// write contention on hot cache keys.
    pub concurrency: usize,
    /// Blocking read timeout; also bounds retry-promotion latency.
    pub block_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            group: "pipeline-workers".to_string(),
            consumer: format!("instance-{}", Uuid::new_v4()),
            concurrency: 1,
            block_ms: 5000,
        }
    }
}

impl WorkerConfig {
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            ..Self::default()
        }
    }
}

/// Drives a [`JobHandler`] against its queue stream.
pub struct QueueWorker {
    redis: ConnectionManager,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
    metrics: QueueMetrics,
}

impl QueueWorker {
    /// `redis` must be a dedicated connection: the read loop issues
    /// blocking XREADGROUP calls.
    pub fn new(redis: ConnectionManager, handler: Arc<dyn JobHandler>, config: WorkerConfig) -> Self {
        Self {
            redis,
            handler,
            config,
            metrics: QueueMetrics::new(),
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<()>) {
        let queue = self.handler.queue();
        let stream = stream_key(queue);

        if let Err(e) = self.ensure_group(&stream).await {
            error!(queue = %queue, error = %e, "Failed to create consumer group");
            return;
        }

        info!(
            queue = %queue,
            group = %self.config.group,
            consumer = %self.config.consumer,
            concurrency = self.config.concurrency,
            "Queue worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!(queue = %queue, "Queue worker shutting down");
                    break;
                }
                _ = self.tick(&stream, queue) => {}
            }
        }
    }

    /// One scheduling round: promote due retries, then read and process
    /// a batch. Infrastructure errors are logged and backed off, never
    /// allowed to kill the loop.
    async fn tick(&mut self, stream: &str, queue: &'static str) {
        if let Err(e) = self.promote_due_retries(stream, queue).await {
            warn!(queue = %queue, error = %e, "Retry promotion failed");
        }

        match self.read_batch(stream).await {
            Ok(batch) => {
                if batch.is_empty() {
                    return;
                }
                let tasks = batch
                    .into_iter()
                    .map(|(entry_id, raw)| self.process_entry(stream, queue, entry_id, raw));
                futures::future::join_all(tasks).await;
            }
            Err(e) => {
                warn!(queue = %queue, error = %e, "Stream read failed");
                sleep(Duration::from_secs(1)).await;
            }
        }
    }

    /// Idempotent group creation (`MKSTREAM` bootstraps the stream).
    async fn ensure_group(&mut self, stream: &str) -> QueueResult<()> {
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(&self.config.group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut self.redis)
            .await;

        match result {
            Ok(()) => Ok(()),
            // BUSYGROUP means the group already exists
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_batch(&mut self, stream: &str) -> QueueResult<Vec<(String, String)>> {
        let options = StreamReadOptions::default()
            .group(&self.config.group, &self.config.consumer)
            .count(self.config.concurrency)
            .block(self.config.block_ms as usize);

        let reply: Option<StreamReadReply> = self
            .redis
            .xread_options(&[stream], &[">"], &options)
            .await?;

        let mut batch = Vec::new();
        if let Some(reply) = reply {
            for key in reply.keys {
                for entry in key.ids {
                    match entry.get::<String>("job") {
                        Some(raw) => batch.push((entry.id, raw)),
                        None => {
                            warn!(stream = %stream, entry_id = %entry.id, "Stream entry missing job field");
                            self.metrics.record_malformed(self.handler.queue());
                            let _ = self.ack(stream, &entry.id).await;
                        }
                    }
                }
            }
        }
        Ok(batch)
    }

    async fn process_entry(&self, stream: &str, queue: &'static str, entry_id: String, raw: String) {
        let envelope = match serde_json::from_str::<JobEnvelope>(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                // A malformed envelope can never succeed; ack it away
                error!(queue = %queue, entry_id = %entry_id, error = %e, "Malformed job envelope");
                self.metrics.record_malformed(queue);
                let _ = self.ack(stream, &entry_id).await;
                return;
            }
        };

        debug!(
            queue = %queue,
            job_id = %envelope.id,
            kind = %envelope.kind,
            attempt = envelope.attempt,
            "Processing job"
        );

        match self.handler.handle(&envelope).await {
            Ok(()) => {
                self.metrics.record_processed(queue);
                if let Err(e) = self.ack(stream, &entry_id).await {
                    warn!(queue = %queue, job_id = %envelope.id, error = %e, "Ack failed; job may redeliver");
                }
            }
            Err(JobError::Permanent(reason)) => {
                // Semantic failure: complete as a logged no-op, never retry
                warn!(
                    queue = %queue,
                    job_id = %envelope.id,
                    kind = %envelope.kind,
                    reason = %reason,
                    "Job failed permanently; completing as no-op"
                );
                self.metrics.record_permanent_failure(queue);
                let _ = self.ack(stream, &entry_id).await;
            }
            Err(JobError::Retryable(reason)) => {
                if envelope.attempts_remaining() {
                    let delay_ms = envelope.retry_delay_ms();
                    warn!(
                        queue = %queue,
                        job_id = %envelope.id,
                        attempt = envelope.attempt,
                        max_attempts = envelope.max_attempts,
                        delay_ms,
                        reason = %reason,
                        "Job failed; scheduling retry"
                    );
                    if let Err(e) = self.schedule_retry(queue, envelope, delay_ms).await {
                        error!(queue = %queue, error = %e, "Failed to schedule retry");
                    }
                    self.metrics.record_retried(queue);
                } else {
                    error!(
                        queue = %queue,
                        job_id = %envelope.id,
                        kind = %envelope.kind,
                        attempts = envelope.attempt,
                        reason = %reason,
                        "Job exhausted retry budget; dead-lettering"
                    );
                    if let Err(e) = self.dead_letter(queue, &envelope).await {
                        error!(queue = %queue, error = %e, "Failed to dead-letter job");
                    }
                    self.metrics.record_dead_lettered(queue);
                }
                let _ = self.ack(stream, &entry_id).await;
            }
        }
    }

    async fn ack(&self, stream: &str, entry_id: &str) -> QueueResult<()> {
        let mut conn = self.redis.clone();
        conn.xack::<_, _, _, i64>(stream, &self.config.group, &[entry_id])
            .await?;
        Ok(())
    }

    async fn schedule_retry(
        &self,
        queue: &str,
        envelope: JobEnvelope,
        delay_ms: u64,
    ) -> QueueResult<()> {
        let due_at = Utc::now().timestamp_millis() + delay_ms as i64;
        let member = serde_json::to_string(&envelope.next_attempt())?;

        let mut conn = self.redis.clone();
        conn.zadd::<_, _, _, ()>(retry_key(queue), member, due_at)
            .await?;
        Ok(())
    }

    async fn dead_letter(&self, queue: &str, envelope: &JobEnvelope) -> QueueResult<()> {
        let data = serde_json::to_string(envelope)?;
        let mut conn = self.redis.clone();
        conn.xadd::<_, _, _, _, String>(dead_letter_key(queue), "*", &[("job", data.as_str())])
            .await?;
        Ok(())
    }

    /// Move due entries from the retry ZSET back onto the stream.
    async fn promote_due_retries(&mut self, stream: &str, queue: &str) -> QueueResult<()> {
        let now = Utc::now().timestamp_millis();
        let key = retry_key(queue);

        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&key)
            .arg("-inf")
            .arg(now)
            .arg("LIMIT")
            .arg(0)
            .arg(100)
            .query_async(&mut self.redis)
            .await?;

        for member in due {
            // Removing first guards against double promotion when several
            // workers share the queue; only the remover re-enqueues.
            let removed: i64 = self.redis.zrem(&key, &member).await?;
            if removed == 0 {
                continue;
            }
            self.redis
                .xadd::<_, _, _, _, String>(stream, "*", &[("job", member.as_str())])
                .await?;
            debug!(queue = %queue, "Promoted retry back onto stream");
        }
        Ok(())
    }
}
