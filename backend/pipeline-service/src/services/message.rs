use crate::cache::ChatCacheManager;
use crate::error::{AppError, AppResult};
use crate::jobs::{message_enqueue_options, LikeJob, MessageJob, SeenJob};
use crate::models::{ChatMessage, ChatMessagesPage, MessageKind, TargetType};
use crate::store::ChatStore;
use chrono::Utc;
use pulse_cache::CacheOps;
use pulse_events::{chat_channel, event, Broadcaster};
use pulse_queue::{enqueue, EnqueueOptions, JobDispatch};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

pub const MAX_MESSAGE_CONTENT: usize = 10_000;

pub struct MessageService<C> {
    chat_store: Arc<dyn ChatStore>,
    chat_cache: ChatCacheManager<C>,
    dispatch: Arc<dyn JobDispatch>,
    broadcaster: Arc<dyn Broadcaster>,
    /// Messages per cached first page.
    page_size: u32,
    message_attempts: u32,
    message_backoff_ms: u64,
}

impl<C: CacheOps> MessageService<C> {
    pub fn new(
        chat_store: Arc<dyn ChatStore>,
        chat_cache: ChatCacheManager<C>,
        dispatch: Arc<dyn JobDispatch>,
        broadcaster: Arc<dyn Broadcaster>,
        page_size: u32,
        message_attempts: u32,
        message_backoff_ms: u64,
    ) -> Self {
        Self {
            chat_store,
            chat_cache,
            dispatch,
            broadcaster,
            page_size,
            message_attempts,
            message_backoff_ms,
        }
    }

    /// The send fan-out: cache write, broadcast and durable enqueue run
    /// concurrently. Only the enqueue can fail the send; the other two
    /// are acceleration and degrade to warnings.
    pub async fn send_message(
        &self,
        chat_id: Uuid,
        sender_id: Uuid,
        content: String,
        reply_to_id: Option<Uuid>,
        shared_post_id: Option<Uuid>,
    ) -> AppResult<ChatMessage> {
        self.require_participant(chat_id, sender_id).await?;

        let content = content.trim().to_string();
        if content.is_empty() && shared_post_id.is_none() {
            return Err(AppError::BadRequest("message cannot be empty".into()));
        }
        if content.len() > MAX_MESSAGE_CONTENT {
            return Err(AppError::BadRequest("message too long".into()));
        }

        let message = ChatMessage {
            id: Uuid::new_v4(),
            chat_id,
            sender_id,
            content,
            reply_to_id,
            kind: if shared_post_id.is_some() {
                MessageKind::SharedPost
            } else {
                MessageKind::Text
            },
            shared_post_id,
            likes: Vec::new(),
            seen: false,
            created_at: Utc::now(),
        };

        let job = MessageJob {
            id: message.id,
            chat_id,
            sender_id,
            content: message.content.clone(),
            reply_to_id,
            kind: message.kind,
            shared_post_id,
            created_at: message.created_at,
        };

        let cache_fut = async {
            self.chat_cache.put_ephemeral(&message).await?;
            self.chat_cache.apply_new_message(&message).await
        };
        // The channel name has to outlive the join below
        let channel = chat_channel(chat_id);
        let broadcast_fut = self.broadcaster.broadcast(
            &channel,
            event::NEW_MESSAGE,
            serde_json::to_value(&message)
                .map_err(|e| AppError::Internal(e.to_string()))?,
        );
        let enqueue_fut = enqueue(
            self.dispatch.as_ref(),
            &job,
            message_enqueue_options(self.message_attempts, self.message_backoff_ms),
        );

        let (cache_result, broadcast_result, enqueue_result) =
            tokio::join!(cache_fut, broadcast_fut, enqueue_fut);

        if let Err(e) = cache_result {
            warn!(message_id = %message.id, error = %e, "Message cache write failed");
        }
        if let Err(e) = broadcast_result {
            warn!(message_id = %message.id, error = %e, "Message broadcast failed");
        }
        enqueue_result?;

        Ok(message)
    }

    /// Cached first page when present, store otherwise.
    pub async fn messages(&self, chat_id: Uuid, viewer_id: Uuid) -> AppResult<ChatMessagesPage> {
        self.require_participant(chat_id, viewer_id).await?;

        if let Some(page) = self.chat_cache.messages_page(chat_id).await {
            return Ok(page);
        }

        let page = self.chat_store.messages_page(chat_id, self.page_size).await?;
        self.chat_cache.set_messages_page(chat_id, &page).await;
        Ok(page)
    }

    pub async fn last_message(
        &self,
        chat_id: Uuid,
        viewer_id: Uuid,
    ) -> AppResult<Option<ChatMessage>> {
        self.require_participant(chat_id, viewer_id).await?;

        if let Some(message) = self.chat_cache.last_message(chat_id).await {
            return Ok(Some(message));
        }

        let page = self.chat_store.messages_page(chat_id, 1).await?;
        let last = page.messages.into_iter().next();
        if let Some(ref message) = last {
            self.chat_cache.set_last_message(chat_id, message).await;
        }
        Ok(last)
    }

    /// Never cached: correctness beats latency for unread badges.
    pub async fn unread_count(&self, chat_id: Uuid, viewer_id: Uuid) -> AppResult<i64> {
        self.require_participant(chat_id, viewer_id).await?;
        self.chat_store.unread_count(chat_id, viewer_id).await
    }

    /// Marking your own message is a silent no-op; everything else is
    /// enqueued for the seen worker.
    pub async fn mark_seen(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        viewer_id: Uuid,
    ) -> AppResult<()> {
        self.require_participant(chat_id, viewer_id).await?;

        let message = self
            .chat_store
            .message_by_id(message_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if message.sender_id == viewer_id {
            return Ok(());
        }

        enqueue(
            self.dispatch.as_ref(),
            &SeenJob {
                id: message_id,
                target_type: TargetType::Message,
                chat_id,
                user_id: viewer_id,
                sender_id: message.sender_id,
            },
            EnqueueOptions::default(),
        )
        .await?;
        Ok(())
    }

    pub async fn like_message(&self, message_id: Uuid, user_id: Uuid) -> AppResult<()> {
        self.enqueue_message_like(message_id, user_id, true).await
    }

    pub async fn unlike_message(&self, message_id: Uuid, user_id: Uuid) -> AppResult<()> {
        self.enqueue_message_like(message_id, user_id, false).await
    }

    /// Pure broadcast, nothing persisted.
    pub async fn typing(&self, chat_id: Uuid, user_id: Uuid) -> AppResult<()> {
        self.require_participant(chat_id, user_id).await?;

        if let Err(e) = self
            .broadcaster
            .broadcast(
                &chat_channel(chat_id),
                event::TYPING,
                json!({ "userId": user_id, "chatId": chat_id }),
            )
            .await
        {
            warn!(chat_id = %chat_id, error = %e, "Typing broadcast failed");
        }
        Ok(())
    }

    async fn enqueue_message_like(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        like: bool,
    ) -> AppResult<()> {
        let message = self
            .chat_store
            .message_by_id(message_id)
            .await?
            .ok_or(AppError::NotFound)?;
        self.require_participant(message.chat_id, user_id).await?;

        let job = if like {
            LikeJob::Like {
                target_id: message_id,
                target_type: TargetType::Message,
                user_id,
                chat_id: Some(message.chat_id),
            }
        } else {
            LikeJob::Unlike {
                target_id: message_id,
                target_type: TargetType::Message,
                user_id,
                chat_id: Some(message.chat_id),
            }
        };
        enqueue(self.dispatch.as_ref(), &job, EnqueueOptions::default()).await?;
        Ok(())
    }

    async fn require_participant(&self, chat_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let participants = self.chat_store.chat_participants(chat_id).await?;
        if participants.is_empty() {
            return Err(AppError::NotFound);
        }
        if !participants.contains(&user_id) {
            return Err(AppError::Forbidden);
        }
        Ok(())
    }
}
