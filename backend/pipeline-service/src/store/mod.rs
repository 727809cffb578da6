//! Persistence seams.
//!
//! Cache managers, workers and services talk to these traits; the
//! relational schema itself is owned elsewhere and reached through
//! [`PgStore`]. [`MemoryStore`] backs deterministic tests.
//!
//! Write methods that return `bool` are idempotent: `false` means the
//! row already existed (or was already gone) and the call was a no-op.
//! Redelivered jobs rely on that.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::AppResult;
use crate::models::{
    ChatMessage, ChatMessagesPage, CommentSummary, NewComment, NewNotification, NewPost,
    NotificationKind, NotificationRecord, PostRecord, TargetType, UserSummary,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowListKind {
    Followers,
    Following,
}

/// A notification row deleted as part of a retraction, paired with the
/// user it had been delivered to.
#[derive(Debug, Clone)]
pub struct RetractedNotification {
    pub recipient_id: Uuid,
    pub notification_id: Uuid,
}

#[async_trait]
pub trait SocialStore: Send + Sync {
    async fn following_ids(&self, user_id: Uuid) -> AppResult<Vec<Uuid>>;

    async fn follower_ids(&self, user_id: Uuid) -> AppResult<Vec<Uuid>>;

    /// One offset page of a user's followers or following list, oldest
    /// follow first.
    async fn follow_page(
        &self,
        user_id: Uuid,
        kind: FollowListKind,
        skip: u32,
        take: u32,
    ) -> AppResult<Vec<UserSummary>>;

    async fn insert_follow(&self, follower_id: Uuid, followee_id: Uuid) -> AppResult<bool>;

    async fn delete_follow(&self, follower_id: Uuid, followee_id: Uuid) -> AppResult<bool>;

    /// Posts by any of the given authors, newest first. `anchor` is a
    /// `(created_at, id)` keyset pair; only rows strictly before it in
    /// that order are returned, so posts sharing a timestamp still
    /// paginate without gaps.
    async fn posts_by_authors(
        &self,
        author_ids: &[Uuid],
        anchor: Option<(DateTime<Utc>, Uuid)>,
        take: u32,
    ) -> AppResult<Vec<PostRecord>>;

    /// Whether at least one post by the given authors sorts strictly
    /// before the `(created_at, id)` anchor. Cheap existence probe used
    /// to disambiguate exact-page-boundary fetches.
    async fn has_posts_before(
        &self,
        author_ids: &[Uuid],
        anchor: (DateTime<Utc>, Uuid),
    ) -> AppResult<bool>;

    /// Batch lookup; deleted IDs are silently absent from the result.
    async fn posts_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<PostRecord>>;

    async fn post_by_id(&self, id: Uuid) -> AppResult<Option<PostRecord>>;

    async fn insert_post(&self, new_post: NewPost) -> AppResult<bool>;

    async fn update_post_text(
        &self,
        post_id: Uuid,
        author_id: Uuid,
        text: String,
    ) -> AppResult<()>;

    async fn delete_post(&self, post_id: Uuid, author_id: Uuid) -> AppResult<()>;

    /// Bump usage counters for the given (lowercased) hashtags.
    async fn upsert_trends(&self, tags: &[String]) -> AppResult<()>;

    async fn insert_comment(&self, new_comment: NewComment) -> AppResult<bool>;

    async fn comment_by_id(&self, comment_id: Uuid) -> AppResult<Option<CommentSummary>>;

    async fn delete_comment(&self, comment_id: Uuid, author_id: Uuid) -> AppResult<()>;

    async fn insert_like(
        &self,
        target_id: Uuid,
        target_type: TargetType,
        user_id: Uuid,
    ) -> AppResult<bool>;

    async fn delete_like(
        &self,
        target_id: Uuid,
        target_type: TargetType,
        user_id: Uuid,
    ) -> AppResult<bool>;

    /// Everyone who currently likes the target.
    async fn like_ids(&self, target_id: Uuid, target_type: TargetType) -> AppResult<Vec<Uuid>>;

    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> AppResult<NotificationRecord>;

    /// Delete the notifications a given actor produced for a target,
    /// e.g. when a like is undone.
    async fn delete_notifications(
        &self,
        actor_id: Uuid,
        kind: NotificationKind,
        target_id: Uuid,
    ) -> AppResult<Vec<RetractedNotification>>;

    /// Delete every notification pointing at a target, e.g. when the
    /// target itself is deleted.
    async fn delete_notifications_for_target(
        &self,
        target_id: Uuid,
    ) -> AppResult<Vec<RetractedNotification>>;
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Participant IDs; empty means the chat does not exist.
    async fn chat_participants(&self, chat_id: Uuid) -> AppResult<Vec<Uuid>>;

    /// Persist a message keyed by its client-generated ID. A conflict on
    /// the ID is a successful no-op.
    async fn insert_message(&self, message: &ChatMessage) -> AppResult<bool>;

    async fn message_by_id(&self, message_id: Uuid) -> AppResult<Option<ChatMessage>>;

    /// The chat's most recent messages, newest first, with like lists
    /// and seen flags resolved.
    async fn messages_page(&self, chat_id: Uuid, take: u32) -> AppResult<ChatMessagesPage>;

    /// Messages in the chat the viewer has not seen and did not send.
    async fn unread_count(&self, chat_id: Uuid, viewer_id: Uuid) -> AppResult<i64>;

    /// Append to the seen ledger. A duplicate is a successful no-op.
    async fn insert_seen(
        &self,
        target_id: Uuid,
        target_type: TargetType,
        user_id: Uuid,
    ) -> AppResult<bool>;
}
