use crate::cache::ChatCacheManager;
use crate::jobs::{queues, SeenJob};
use crate::models::TargetType;
use crate::store::ChatStore;
use async_trait::async_trait;
use pulse_cache::CacheOps;
use pulse_events::{chat_channel, event, user_channel, Broadcaster};
use pulse_queue::{JobEnvelope, JobError, JobHandler};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct SeenWorker<C> {
    chat_store: Arc<dyn ChatStore>,
    chat_cache: ChatCacheManager<C>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl<C: CacheOps> SeenWorker<C> {
    pub fn new(
        chat_store: Arc<dyn ChatStore>,
        chat_cache: ChatCacheManager<C>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            chat_store,
            chat_cache,
            broadcaster,
        }
    }
}

#[async_trait]
impl<C: CacheOps + 'static> JobHandler for SeenWorker<C> {
    fn queue(&self) -> &'static str {
        queues::SEEN
    }

    async fn handle(&self, job: &JobEnvelope) -> Result<(), JobError> {
        let seen: SeenJob = job.decode().map_err(JobError::permanent)?;

        // The ledger's unique constraint makes duplicates a successful
        // no-op; patches and broadcasts below are idempotent too, so a
        // redelivered job just repeats them harmlessly.
        let inserted = self
            .chat_store
            .insert_seen(seen.id, seen.target_type, seen.user_id)
            .await?;
        if !inserted {
            debug!(target_id = %seen.id, user_id = %seen.user_id, "Seen entry already present");
        }

        if seen.target_type == TargetType::Message {
            self.chat_cache
                .patch_message_seen(seen.chat_id, seen.id)
                .await;

            let payload = json!({
                "messageId": seen.id,
                "chatId": seen.chat_id,
                "seenBy": seen.user_id,
            });

            if let Err(e) = self
                .broadcaster
                .broadcast(
                    &chat_channel(seen.chat_id),
                    event::MESSAGE_SEEN,
                    payload.clone(),
                )
                .await
            {
                warn!(chat_id = %seen.chat_id, error = %e, "Seen broadcast to chat failed");
            }

            // The sender gets a read receipt even when they are not
            // looking at the chat
            if let Err(e) = self
                .broadcaster
                .broadcast(&user_channel(seen.sender_id), event::MESSAGE_SEEN, payload)
                .await
            {
                warn!(user_id = %seen.sender_id, error = %e, "Seen broadcast to sender failed");
            }
        }

        Ok(())
    }
}
