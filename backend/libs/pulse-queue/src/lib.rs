//! Pulse job queue
//!
//! Durable, at-least-once task queues over Redis Streams with named queues,
//! consumer groups, exponential retry backoff, and dead-lettering. One queue
//! per activity class (posts, comments, likes, seen-receipts, messages).
//!
//! Ordering within a queue is best-effort FIFO and must not be relied upon
//! for correctness: retries re-enter at the tail, so handlers are written to
//! be idempotent wherever the entity allows duplicate application.

mod dispatch;
mod error;
mod job;
mod metrics;
mod worker;

pub use dispatch::{enqueue, JobDispatch, MemoryJobQueue, RedisJobQueue};
pub use error::{JobError, QueueError, QueueResult};
pub use job::{
    dead_letter_key, retry_key, stream_key, Backoff, EnqueueOptions, JobEnvelope, QueueJob,
};
pub use metrics::QueueMetrics;
pub use worker::{JobHandler, QueueWorker, WorkerConfig};
