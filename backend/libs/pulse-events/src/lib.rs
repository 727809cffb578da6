//! Pulse broadcast gateway
//!
//! Thin seam over the real-time publish/subscribe transport. The transport
//! itself (websocket fan-out to connected clients) is an external
//! collaborator; this crate only knows how to name channels and publish
//! `{event, payload}` envelopes to them.
//!
//! Broadcasts are best-effort acceleration: callers log failures and move
//! on, they never surface them to users or fail jobs over them.

mod channels;

pub use channels::{
    chat_channel, event, notification_channel, notification_retraction, user_channel,
};

use redis_utils::SharedConnectionManager;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Error, Debug)]
pub enum BroadcastError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type BroadcastResult<T> = Result<T, BroadcastError>;

/// Envelope published on a channel.
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastEnvelope<'a> {
    pub event: &'a str,
    pub payload: serde_json::Value,
}

/// Opaque `broadcast(channel, event, payload)` capability.
#[async_trait::async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> BroadcastResult<()>;
}

/// Publishes envelopes over Redis pub/sub; the realtime edge subscribes
/// and relays to connected clients.
#[derive(Clone)]
pub struct RedisBroadcaster {
    redis: SharedConnectionManager,
}

impl RedisBroadcaster {
    pub fn new(redis: SharedConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait::async_trait]
impl Broadcaster for RedisBroadcaster {
    async fn broadcast(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> BroadcastResult<()> {
        let envelope = serde_json::to_string(&BroadcastEnvelope { event, payload })?;

        let mut conn = self.redis.lock().await;
        redis::cmd("PUBLISH")
            .arg(channel)
            .arg(envelope)
            .query_async::<_, i64>(&mut *conn)
            .await?;

        debug!(channel = %channel, event = %event, "Broadcast published");
        Ok(())
    }
}

/// Records every broadcast for assertions in tests.
#[derive(Clone, Default)]
pub struct RecordingBroadcaster {
    events: Arc<Mutex<Vec<RecordedBroadcast>>>,
}

#[derive(Debug, Clone)]
pub struct RecordedBroadcast {
    pub channel: String,
    pub event: String,
    pub payload: serde_json::Value,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<RecordedBroadcast> {
        self.events.lock().await.clone()
    }

    pub async fn on_channel(&self, channel: &str) -> Vec<RecordedBroadcast> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|b| b.channel == channel)
            .cloned()
            .collect()
    }

    pub async fn clear(&self) {
        self.events.lock().await.clear();
    }
}

#[async_trait::async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn broadcast(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> BroadcastResult<()> {
        self.events.lock().await.push(RecordedBroadcast {
            channel: channel.to_string(),
            event: event.to_string(),
            payload,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_wire_shape() {
        let envelope = BroadcastEnvelope {
            event: event::NEW_MESSAGE,
            payload: serde_json::json!({"id": "abc"}),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["event"], "new-message");
        assert_eq!(json["payload"]["id"], "abc");
    }

    #[tokio::test]
    async fn recording_broadcaster_filters_by_channel() {
        let recorder = RecordingBroadcaster::new();
        recorder
            .broadcast("a", event::TYPING, serde_json::json!({}))
            .await
            .unwrap();
        recorder
            .broadcast("b", event::TYPING, serde_json::json!({}))
            .await
            .unwrap();

        assert_eq!(recorder.all().await.len(), 2);
        assert_eq!(recorder.on_channel("a").await.len(), 1);
    }
}
