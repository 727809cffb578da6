use crate::cache::ChatCacheManager;
use crate::error::AppError;
use crate::invalidation::CacheInvalidator;
use crate::jobs::{queues, LikeJob};
use crate::models::{NewNotification, NotificationKind, TargetType};
use crate::store::{ChatStore, SocialStore};
use async_trait::async_trait;
use pulse_cache::CacheOps;
use pulse_events::{
    chat_channel, event, notification_channel, notification_retraction, user_channel, Broadcaster,
};
use pulse_queue::{JobEnvelope, JobError, JobHandler};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct LikeWorker<C> {
    store: Arc<dyn SocialStore>,
    chat_store: Arc<dyn ChatStore>,
    invalidator: CacheInvalidator<C>,
    chat_cache: ChatCacheManager<C>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl<C: CacheOps> LikeWorker<C> {
    pub fn new(
        store: Arc<dyn SocialStore>,
        chat_store: Arc<dyn ChatStore>,
        invalidator: CacheInvalidator<C>,
        chat_cache: ChatCacheManager<C>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            store,
            chat_store,
            invalidator,
            chat_cache,
            broadcaster,
        }
    }

    async fn like(
        &self,
        target_id: Uuid,
        target_type: TargetType,
        user_id: Uuid,
        chat_id: Option<Uuid>,
    ) -> Result<(), JobError> {
        let inserted = self.store.insert_like(target_id, target_type, user_id).await?;
        if !inserted {
            debug!(target_id = %target_id, user_id = %user_id, "Like already recorded");
            return Ok(());
        }

        match target_type {
            TargetType::Post => {
                let post = self
                    .store
                    .post_by_id(target_id)
                    .await?
                    .ok_or_else(|| JobError::permanent(AppError::NotFound))?;
                self.invalidate_post(target_id).await;
                if post.author.id != user_id {
                    self.notify_like(post.author.id, user_id, target_id).await?;
                }
            }
            TargetType::Comment => {
                let comment = self
                    .store
                    .comment_by_id(target_id)
                    .await?
                    .ok_or_else(|| JobError::permanent(AppError::NotFound))?;
                self.invalidate_post(comment.post_id).await;
                if comment.author_id != user_id {
                    self.notify_like(comment.author_id, user_id, target_id)
                        .await?;
                }
            }
            TargetType::Message => {
                self.sync_message_likes(target_id, user_id, chat_id).await?;
            }
        }
        Ok(())
    }

    async fn unlike(
        &self,
        target_id: Uuid,
        target_type: TargetType,
        user_id: Uuid,
        chat_id: Option<Uuid>,
    ) -> Result<(), JobError> {
        let removed = self.store.delete_like(target_id, target_type, user_id).await?;
        if !removed {
            debug!(target_id = %target_id, user_id = %user_id, "Like already absent");
            return Ok(());
        }

        match target_type {
            TargetType::Post => {
                self.invalidate_post(target_id).await;
                self.retract_like_notifications(user_id, target_id).await?;
            }
            TargetType::Comment => {
                if let Some(comment) = self.store.comment_by_id(target_id).await? {
                    self.invalidate_post(comment.post_id).await;
                }
                self.retract_like_notifications(user_id, target_id).await?;
            }
            TargetType::Message => {
                self.sync_message_likes(target_id, user_id, chat_id).await?;
            }
        }
        Ok(())
    }

    /// Message likes skip notification rows entirely: the fresh like
    /// list is broadcast to the chat, mirrored to every other
    /// participant's background channel, and patched into the cache.
    async fn sync_message_likes(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        chat_id: Option<Uuid>,
    ) -> Result<(), JobError> {
        let chat_id = chat_id
            .ok_or_else(|| JobError::permanent("message like without chat id"))?;

        let likes = self.store.like_ids(message_id, TargetType::Message).await?;
        let payload = json!({
            "messageId": message_id,
            "chatId": chat_id,
            "likes": likes,
        });

        if let Err(e) = self
            .broadcaster
            .broadcast(
                &chat_channel(chat_id),
                event::MESSAGE_LIKE_UPDATED,
                payload.clone(),
            )
            .await
        {
            warn!(chat_id = %chat_id, error = %e, "Like broadcast to chat failed");
        }

        let participants = self.chat_store.chat_participants(chat_id).await?;
        for participant in participants.iter().filter(|p| **p != user_id) {
            if let Err(e) = self
                .broadcaster
                .broadcast(
                    &user_channel(*participant),
                    event::MESSAGE_LIKE_UPDATED,
                    payload.clone(),
                )
                .await
            {
                warn!(user_id = %participant, error = %e, "Like broadcast to user failed");
            }
        }

        self.chat_cache
            .patch_message_like(chat_id, message_id, &likes)
            .await;
        Ok(())
    }

    async fn invalidate_post(&self, post_id: Uuid) {
        if let Err(e) = self.invalidator.invalidate_post(post_id).await {
            warn!(post_id = %post_id, error = %e, "Post invalidation failed");
        }
    }

    async fn notify_like(
        &self,
        recipient_id: Uuid,
        actor_id: Uuid,
        target_id: Uuid,
    ) -> Result<(), JobError> {
        let record = self
            .store
            .insert_notification(NewNotification {
                recipient_id,
                actor_id,
                kind: NotificationKind::Like,
                target_id,
            })
            .await?;

        if let Err(e) = self
            .broadcaster
            .broadcast(
                &notification_channel(recipient_id),
                event::NEW_NOTIFICATION,
                serde_json::to_value(&record).map_err(JobError::permanent)?,
            )
            .await
        {
            warn!(recipient = %recipient_id, error = %e, "Like notification broadcast failed");
        }
        Ok(())
    }

    async fn retract_like_notifications(
        &self,
        actor_id: Uuid,
        target_id: Uuid,
    ) -> Result<(), JobError> {
        let retracted = self
            .store
            .delete_notifications(actor_id, NotificationKind::Like, target_id)
            .await?;
        for item in retracted {
            if let Err(e) = self
                .broadcaster
                .broadcast(
                    &notification_channel(item.recipient_id),
                    event::NEW_NOTIFICATION,
                    notification_retraction(item.notification_id),
                )
                .await
            {
                warn!(recipient = %item.recipient_id, error = %e, "Notification retraction broadcast failed");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<C: CacheOps + 'static> JobHandler for LikeWorker<C> {
    fn queue(&self) -> &'static str {
        queues::LIKES
    }

    async fn handle(&self, job: &JobEnvelope) -> Result<(), JobError> {
        match job.decode::<LikeJob>().map_err(JobError::permanent)? {
            LikeJob::Like {
                target_id,
                target_type,
                user_id,
                chat_id,
            } => self.like(target_id, target_type, user_id, chat_id).await,
            LikeJob::Unlike {
                target_id,
                target_type,
                user_id,
                chat_id,
            } => self.unlike(target_id, target_type, user_id, chat_id).await,
        }
    }
}
