//! Chat message caches.
//!
//! Three key families, all owned here:
//! - `messages:{chatId}`: the chat's first page, patched in place as
//!   messages arrive, get liked or get seen
//! - `lastMessage:{chatId}`: snapshot driving the conversation list
//! - `message:{id}`: ephemeral no-TTL snapshot bridging the window
//!   between broadcast and durable persistence; deleted by the message
//!   worker once the row lands
//!
//! Patches are read-modify-write without compare-and-set; concurrent
//! patchers can lose an update, which the short TTL repairs.

use crate::error::AppResult;
use crate::models::{ChatMessage, ChatMessagesPage};
use pulse_cache::{ttl, CacheKey, CacheOps};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

pub struct ChatCacheManager<C> {
    cache: Arc<C>,
}

impl<C> Clone for ChatCacheManager<C> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<C: CacheOps> ChatCacheManager<C> {
    pub fn new(cache: Arc<C>) -> Self {
        Self { cache }
    }

    pub async fn messages_page(&self, chat_id: Uuid) -> Option<ChatMessagesPage> {
        let key = CacheKey::chat_messages(chat_id);
        match self.cache.get(&key).await {
            Ok(page) => page,
            Err(e) => {
                warn!(key = %key, error = %e, "Chat cache read failed, falling back to store");
                None
            }
        }
    }

    pub async fn set_messages_page(&self, chat_id: Uuid, page: &ChatMessagesPage) {
        let key = CacheKey::chat_messages(chat_id);
        if let Err(e) = self.cache.set(&key, page, ttl::CHAT_MESSAGES).await {
            warn!(key = %key, error = %e, "Chat cache write failed");
        }
    }

    /// Patch a freshly sent message onto the cached first page (when one
    /// exists) and roll the last-message snapshot forward.
    pub async fn apply_new_message(&self, message: &ChatMessage) -> AppResult<()> {
        if let Some(mut page) = self.messages_page(message.chat_id).await {
            page.messages.insert(0, message.clone());
            self.set_messages_page(message.chat_id, &page).await;
        }
        self.set_last_message(message.chat_id, message).await;
        Ok(())
    }

    /// Replace the like list of a cached message. Returns whether any
    /// cached copy was actually patched.
    pub async fn patch_message_like(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        likes: &[Uuid],
    ) -> bool {
        let mut patched = false;

        if let Some(mut page) = self.messages_page(chat_id).await {
            if let Some(msg) = page.messages.iter_mut().find(|m| m.id == message_id) {
                msg.likes = likes.to_vec();
                patched = true;
            }
            if patched {
                self.set_messages_page(chat_id, &page).await;
            }
        }

        if let Some(mut last) = self.last_message(chat_id).await {
            if last.id == message_id {
                last.likes = likes.to_vec();
                self.set_last_message(chat_id, &last).await;
                patched = true;
            }
        }

        patched
    }

    /// Flip the seen flag of a cached message.
    pub async fn patch_message_seen(&self, chat_id: Uuid, message_id: Uuid) -> bool {
        let mut patched = false;

        if let Some(mut page) = self.messages_page(chat_id).await {
            if let Some(msg) = page.messages.iter_mut().find(|m| m.id == message_id) {
                if !msg.seen {
                    msg.seen = true;
                    patched = true;
                }
            }
            if patched {
                self.set_messages_page(chat_id, &page).await;
            }
        }

        if let Some(mut last) = self.last_message(chat_id).await {
            if last.id == message_id && !last.seen {
                last.seen = true;
                self.set_last_message(chat_id, &last).await;
                patched = true;
            }
        }

        patched
    }

    pub async fn last_message(&self, chat_id: Uuid) -> Option<ChatMessage> {
        let key = CacheKey::last_message(chat_id);
        match self.cache.get(&key).await {
            Ok(message) => message,
            Err(e) => {
                warn!(key = %key, error = %e, "Last-message cache read failed");
                None
            }
        }
    }

    pub async fn set_last_message(&self, chat_id: Uuid, message: &ChatMessage) {
        let key = CacheKey::last_message(chat_id);
        if let Err(e) = self.cache.set(&key, message, ttl::LAST_MESSAGE).await {
            warn!(key = %key, error = %e, "Last-message cache write failed");
        }
    }

    /// Pre-persistence snapshot. Deliberately no TTL: it must outlive
    /// any retry/backoff window and is deleted once the row is durable.
    pub async fn put_ephemeral(&self, message: &ChatMessage) -> AppResult<()> {
        self.cache
            .set_forever(&CacheKey::message(message.id), message)
            .await?;
        Ok(())
    }

    pub async fn ephemeral(&self, message_id: Uuid) -> Option<ChatMessage> {
        match self.cache.get(&CacheKey::message(message_id)).await {
            Ok(message) => message,
            Err(e) => {
                warn!(message_id = %message_id, error = %e, "Ephemeral message read failed");
                None
            }
        }
    }

    pub async fn drop_ephemeral(&self, message_id: Uuid) {
        if let Err(e) = self.cache.del(&CacheKey::message(message_id)).await {
            warn!(message_id = %message_id, error = %e, "Ephemeral message delete failed");
        }
    }
}
