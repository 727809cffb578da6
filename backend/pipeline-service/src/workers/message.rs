use crate::cache::ChatCacheManager;
use crate::jobs::{queues, MessageJob};
use crate::models::ChatMessage;
use crate::store::ChatStore;
use async_trait::async_trait;
use pulse_cache::CacheOps;
use pulse_queue::{JobEnvelope, JobError, JobHandler};
use std::sync::Arc;
use tracing::debug;

/// Persists messages that were already broadcast and cached on the
/// request path. This is the only queue with a retry budget: losing a
/// message here loses it for good once the ephemeral snapshot expires
/// from view.
pub struct MessageWorker<C> {
    chat_store: Arc<dyn ChatStore>,
    chat_cache: ChatCacheManager<C>,
}

impl<C: CacheOps> MessageWorker<C> {
    pub fn new(chat_store: Arc<dyn ChatStore>, chat_cache: ChatCacheManager<C>) -> Self {
        Self {
            chat_store,
            chat_cache,
        }
    }
}

#[async_trait]
impl<C: CacheOps + 'static> JobHandler for MessageWorker<C> {
    fn queue(&self) -> &'static str {
        queues::MESSAGES
    }

    async fn handle(&self, job: &JobEnvelope) -> Result<(), JobError> {
        let payload: MessageJob = job.decode().map_err(JobError::permanent)?;

        let message = ChatMessage {
            id: payload.id,
            chat_id: payload.chat_id,
            sender_id: payload.sender_id,
            content: payload.content,
            reply_to_id: payload.reply_to_id,
            kind: payload.kind,
            shared_post_id: payload.shared_post_id,
            likes: Vec::new(),
            seen: false,
            created_at: payload.created_at,
        };

        // ID conflict means an earlier delivery already landed the row
        let inserted = self.chat_store.insert_message(&message).await?;
        if !inserted {
            debug!(message_id = %message.id, "Message already persisted, redelivery tolerated");
        }

        // Durable now; the pre-persistence snapshot has done its job
        self.chat_cache.drop_ephemeral(message.id).await;
        Ok(())
    }
}
