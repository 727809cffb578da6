use crate::error::AppError;
use crate::invalidation::CacheInvalidator;
use crate::jobs::{queues, CommentJob};
use crate::models::{NewComment, NewNotification, NotificationKind, NotificationRecord};
use crate::store::SocialStore;
use async_trait::async_trait;
use pulse_cache::CacheOps;
use pulse_events::{event, notification_channel, notification_retraction, Broadcaster};
use pulse_queue::{JobEnvelope, JobError, JobHandler};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct CommentWorker<C> {
    store: Arc<dyn SocialStore>,
    invalidator: CacheInvalidator<C>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl<C: CacheOps> CommentWorker<C> {
    pub fn new(
        store: Arc<dyn SocialStore>,
        invalidator: CacheInvalidator<C>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            store,
            invalidator,
            broadcaster,
        }
    }

    async fn create(
        &self,
        comment_id: Uuid,
        post_id: Uuid,
        user_id: Uuid,
        text: String,
        parent_id: Option<Uuid>,
    ) -> Result<(), JobError> {
        let inserted = self
            .store
            .insert_comment(NewComment {
                id: comment_id,
                post_id,
                author_id: user_id,
                text,
                parent_id,
            })
            .await?;
        if !inserted {
            debug!(comment_id = %comment_id, "Comment already persisted, skipping side effects");
            return Ok(());
        }

        // The request path dropped the post's cache entry before
        // enqueueing; notifications are the worker's side of the deal.
        let post = self
            .store
            .post_by_id(post_id)
            .await?
            .ok_or_else(|| JobError::permanent(AppError::NotFound))?;

        let mut notified: Vec<Uuid> = Vec::new();
        if post.author.id != user_id {
            self.notify(
                post.author.id,
                user_id,
                NotificationKind::Comment,
                post_id,
            )
            .await?;
            notified.push(post.author.id);
        }

        if let Some(parent_id) = parent_id {
            if let Some(parent) = self.store.comment_by_id(parent_id).await? {
                if parent.author_id != user_id && !notified.contains(&parent.author_id) {
                    self.notify(
                        parent.author_id,
                        user_id,
                        NotificationKind::Reply,
                        post_id,
                    )
                    .await?;
                }
            }
        }

        Ok(())
    }

    async fn delete(&self, comment_id: Uuid, user_id: Uuid) -> Result<(), JobError> {
        let comment = self
            .store
            .comment_by_id(comment_id)
            .await?
            .ok_or_else(|| JobError::permanent(AppError::NotFound))?;

        self.store.delete_comment(comment_id, user_id).await?;

        if let Err(e) = self.invalidator.invalidate_post(comment.post_id).await {
            warn!(post_id = %comment.post_id, error = %e, "Post invalidation failed");
        }

        // Notifications pointing at the comment are retracted from
        // whoever received them
        let retracted = self.store.delete_notifications_for_target(comment_id).await?;
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

    async fn notify(
        &self,
        recipient_id: Uuid,
        actor_id: Uuid,
        kind: NotificationKind,
        target_id: Uuid,
    ) -> Result<(), JobError> {
        let record: NotificationRecord = self
            .store
            .insert_notification(NewNotification {
                recipient_id,
                actor_id,
                kind,
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
            warn!(recipient = %recipient_id, error = %e, "Notification broadcast failed");
        }
        Ok(())
    }
}

#[async_trait]
impl<C: CacheOps + 'static> JobHandler for CommentWorker<C> {
    fn queue(&self) -> &'static str {
        queues::COMMENTS
    }

    async fn handle(&self, job: &JobEnvelope) -> Result<(), JobError> {
        match job.decode::<CommentJob>().map_err(JobError::permanent)? {
            CommentJob::Create {
                comment_id,
                post_id,
                user_id,
                text,
                parent_id,
            } => {
                self.create(comment_id, post_id, user_id, text, parent_id)
                    .await
            }
            CommentJob::Delete {
                comment_id,
                user_id,
            } => self.delete(comment_id, user_id).await,
        }
    }
}
