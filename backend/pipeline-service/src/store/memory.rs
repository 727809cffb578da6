//! In-memory store for tests. Mirrors the idempotency semantics of the
//! relational schema's unique constraints.

use super::{ChatStore, FollowListKind, RetractedNotification, SocialStore};
use crate::error::{AppError, AppResult};
use crate::models::{
    ChatMessage, ChatMessagesPage, ChatSummary, CommentSummary, MessageKind, NewComment,
    NewNotification, NewPost, NotificationKind, NotificationRecord, PostRecord, TargetType,
    UserSummary,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Clone)]
struct StoredPost {
    id: Uuid,
    author_id: Uuid,
    text: String,
    media: Vec<String>,
    created_at: DateTime<Utc>,
}

#[derive(Clone)]
struct StoredComment {
    id: Uuid,
    post_id: Uuid,
    author_id: Uuid,
    text: String,
    parent_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    seq: u64,
}

#[derive(Clone)]
struct StoredMessage {
    id: Uuid,
    chat_id: Uuid,
    sender_id: Uuid,
    content: String,
    reply_to_id: Option<Uuid>,
    kind: MessageKind,
    shared_post_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, UserSummary>,
    /// (follower, followee), insertion order doubles as follow time.
    follows: Vec<(Uuid, Uuid)>,
    posts: HashMap<Uuid, StoredPost>,
    comments: HashMap<Uuid, StoredComment>,
    /// (target, target type, user), insertion ordered.
    likes: Vec<(Uuid, TargetType, Uuid)>,
    notifications: Vec<NotificationRecord>,
    trends: HashMap<String, u64>,
    chats: HashMap<Uuid, Vec<Uuid>>,
    messages: HashMap<Uuid, StoredMessage>,
    seen: HashSet<(Uuid, TargetType, Uuid)>,
    seq: u64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.lock().unwrap().users.insert(
            id,
            UserSummary {
                id,
                username: username.to_string(),
                avatar_url: None,
            },
        );
        id
    }

    pub fn add_chat(&self, participants: Vec<Uuid>) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.lock().unwrap().chats.insert(id, participants);
        id
    }

    /// Insert a post with an explicit timestamp so pagination tests can
    /// pin the ordering.
    pub fn add_post_at(&self, author_id: Uuid, text: &str, created_at: DateTime<Utc>) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.lock().unwrap().posts.insert(
            id,
            StoredPost {
                id,
                author_id,
                text: text.to_string(),
                media: Vec::new(),
                created_at,
            },
        );
        id
    }

    pub fn trend_uses(&self, tag: &str) -> u64 {
        self.inner
            .lock()
            .unwrap()
            .trends
            .get(tag)
            .copied()
            .unwrap_or(0)
    }

    pub fn notification_count(&self) -> usize {
        self.inner.lock().unwrap().notifications.len()
    }

    fn author_summary(inner: &Inner, author_id: Uuid) -> UserSummary {
        inner.users.get(&author_id).cloned().unwrap_or(UserSummary {
            id: author_id,
            username: "unknown".to_string(),
            avatar_url: None,
        })
    }

    fn hydrate_post(inner: &Inner, post: &StoredPost) -> PostRecord {
        let like_count = inner
            .likes
            .iter()
            .filter(|(t, ty, _)| *t == post.id && *ty == TargetType::Post)
            .count() as i64;

        let mut comments: Vec<&StoredComment> = inner
            .comments
            .values()
            .filter(|c| c.post_id == post.id)
            .collect();
        comments.sort_by_key(|c| (c.created_at, c.seq));

        PostRecord {
            id: post.id,
            author: Self::author_summary(inner, post.author_id),
            text: post.text.clone(),
            media: post.media.clone(),
            like_count,
            comment_count: comments.len() as i64,
            first_comment: comments.first().map(|c| CommentSummary {
                id: c.id,
                post_id: c.post_id,
                author_id: c.author_id,
                text: c.text.clone(),
                parent_id: c.parent_id,
                created_at: c.created_at,
            }),
            created_at: post.created_at,
        }
    }

    fn hydrate_message(inner: &Inner, stored: &StoredMessage) -> ChatMessage {
        let likes: Vec<Uuid> = inner
            .likes
            .iter()
            .filter(|(t, ty, _)| *t == stored.id && *ty == TargetType::Message)
            .map(|(_, _, u)| *u)
            .collect();
        let seen = inner
            .seen
            .iter()
            .any(|(t, ty, u)| *t == stored.id && *ty == TargetType::Message && *u != stored.sender_id);

        ChatMessage {
            id: stored.id,
            chat_id: stored.chat_id,
            sender_id: stored.sender_id,
            content: stored.content.clone(),
            reply_to_id: stored.reply_to_id,
            kind: stored.kind,
            shared_post_id: stored.shared_post_id,
            likes,
            seen,
            created_at: stored.created_at,
        }
    }
}

#[async_trait]
impl SocialStore for MemoryStore {
    async fn following_ids(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .follows
            .iter()
            .filter(|(follower, _)| *follower == user_id)
            .map(|(_, followee)| *followee)
            .collect())
    }

    async fn follower_ids(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .follows
            .iter()
            .filter(|(_, followee)| *followee == user_id)
            .map(|(follower, _)| *follower)
            .collect())
    }

    async fn follow_page(
        &self,
        user_id: Uuid,
        kind: FollowListKind,
        skip: u32,
        take: u32,
    ) -> AppResult<Vec<UserSummary>> {
        let inner = self.inner.lock().unwrap();
        let ids: Vec<Uuid> = match kind {
            FollowListKind::Followers => inner
                .follows
                .iter()
                .filter(|(_, followee)| *followee == user_id)
                .map(|(follower, _)| *follower)
                .collect(),
            FollowListKind::Following => inner
                .follows
                .iter()
                .filter(|(follower, _)| *follower == user_id)
                .map(|(_, followee)| *followee)
                .collect(),
        };

        Ok(ids
            .into_iter()
            .skip(skip as usize)
            .take(take as usize)
            .map(|id| Self::author_summary(&inner, id))
            .collect())
    }

    async fn insert_follow(&self, follower_id: Uuid, followee_id: Uuid) -> AppResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .follows
            .iter()
            .any(|&(a, b)| a == follower_id && b == followee_id)
        {
            return Ok(false);
        }
        inner.follows.push((follower_id, followee_id));
        Ok(true)
    }

    async fn delete_follow(&self, follower_id: Uuid, followee_id: Uuid) -> AppResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.follows.len();
        inner
            .follows
            .retain(|&(a, b)| !(a == follower_id && b == followee_id));
        Ok(inner.follows.len() < before)
    }

    async fn posts_by_authors(
        &self,
        author_ids: &[Uuid],
        anchor: Option<(DateTime<Utc>, Uuid)>,
        take: u32,
    ) -> AppResult<Vec<PostRecord>> {
        let inner = self.inner.lock().unwrap();
        let mut posts: Vec<&StoredPost> = inner
            .posts
            .values()
            .filter(|p| author_ids.contains(&p.author_id))
            .filter(|p| anchor.map_or(true, |a| (p.created_at, p.id) < a))
            .collect();
        posts.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        posts.truncate(take as usize);

        Ok(posts
            .into_iter()
            .map(|p| Self::hydrate_post(&inner, p))
            .collect())
    }

    async fn has_posts_before(
        &self,
        author_ids: &[Uuid],
        anchor: (DateTime<Utc>, Uuid),
    ) -> AppResult<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .posts
            .values()
            .any(|p| author_ids.contains(&p.author_id) && (p.created_at, p.id) < anchor))
    }

    async fn posts_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<PostRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| inner.posts.get(id))
            .map(|p| Self::hydrate_post(&inner, p))
            .collect())
    }

    async fn post_by_id(&self, id: Uuid) -> AppResult<Option<PostRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.posts.get(&id).map(|p| Self::hydrate_post(&inner, p)))
    }

    async fn insert_post(&self, new_post: NewPost) -> AppResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner.posts.contains_key(&new_post.id) {
            return Ok(false);
        }
        inner.posts.insert(
            new_post.id,
            StoredPost {
                id: new_post.id,
                author_id: new_post.author_id,
                text: new_post.text,
                media: new_post.media,
                created_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn update_post_text(
        &self,
        post_id: Uuid,
        author_id: Uuid,
        text: String,
    ) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let post = inner.posts.get_mut(&post_id).ok_or(AppError::NotFound)?;
        if post.author_id != author_id {
            return Err(AppError::Forbidden);
        }
        post.text = text;
        Ok(())
    }

    async fn delete_post(&self, post_id: Uuid, author_id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let post = inner.posts.get(&post_id).ok_or(AppError::NotFound)?;
        if post.author_id != author_id {
            return Err(AppError::Forbidden);
        }
        inner.posts.remove(&post_id);
        Ok(())
    }

    async fn upsert_trends(&self, tags: &[String]) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        for tag in tags {
            *inner.trends.entry(tag.clone()).or_insert(0) += 1;
        }
        Ok(())
    }

    async fn insert_comment(&self, new_comment: NewComment) -> AppResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner.comments.contains_key(&new_comment.id) {
            return Ok(false);
        }
        inner.seq += 1;
        let seq = inner.seq;
        inner.comments.insert(
            new_comment.id,
            StoredComment {
                id: new_comment.id,
                post_id: new_comment.post_id,
                author_id: new_comment.author_id,
                text: new_comment.text,
                parent_id: new_comment.parent_id,
                created_at: Utc::now(),
                seq,
            },
        );
        Ok(true)
    }

    async fn comment_by_id(&self, comment_id: Uuid) -> AppResult<Option<CommentSummary>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.comments.get(&comment_id).map(|c| CommentSummary {
            id: c.id,
            post_id: c.post_id,
            author_id: c.author_id,
            text: c.text.clone(),
            parent_id: c.parent_id,
            created_at: c.created_at,
        }))
    }

    async fn delete_comment(&self, comment_id: Uuid, author_id: Uuid) -> AppResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let comment = inner.comments.get(&comment_id).ok_or(AppError::NotFound)?;
        if comment.author_id != author_id {
            return Err(AppError::Forbidden);
        }
        inner.comments.remove(&comment_id);
        Ok(())
    }

    async fn insert_like(
        &self,
        target_id: Uuid,
        target_type: TargetType,
        user_id: Uuid,
    ) -> AppResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let row = (target_id, target_type, user_id);
        if inner.likes.contains(&row) {
            return Ok(false);
        }
        inner.likes.push(row);
        Ok(true)
    }

    async fn delete_like(
        &self,
        target_id: Uuid,
        target_type: TargetType,
        user_id: Uuid,
    ) -> AppResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.likes.len();
        inner
            .likes
            .retain(|&row| row != (target_id, target_type, user_id));
        Ok(inner.likes.len() < before)
    }

    async fn like_ids(&self, target_id: Uuid, target_type: TargetType) -> AppResult<Vec<Uuid>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .likes
            .iter()
            .filter(|(t, ty, _)| *t == target_id && *ty == target_type)
            .map(|(_, _, u)| *u)
            .collect())
    }

    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> AppResult<NotificationRecord> {
        let record = NotificationRecord {
            id: Uuid::new_v4(),
            recipient_id: notification.recipient_id,
            actor_id: notification.actor_id,
            kind: notification.kind,
            target_id: notification.target_id,
            created_at: Utc::now(),
        };
        self.inner
            .lock()
            .unwrap()
            .notifications
            .push(record.clone());
        Ok(record)
    }

    async fn delete_notifications(
        &self,
        actor_id: Uuid,
        kind: NotificationKind,
        target_id: Uuid,
    ) -> AppResult<Vec<RetractedNotification>> {
        let mut inner = self.inner.lock().unwrap();
        let (removed, kept): (Vec<_>, Vec<_>) = inner.notifications.drain(..).partition(|n| {
            n.actor_id == actor_id && n.kind == kind && n.target_id == target_id
        });
        inner.notifications = kept;
        Ok(removed
            .into_iter()
            .map(|n| RetractedNotification {
                recipient_id: n.recipient_id,
                notification_id: n.id,
            })
            .collect())
    }

    async fn delete_notifications_for_target(
        &self,
        target_id: Uuid,
    ) -> AppResult<Vec<RetractedNotification>> {
        let mut inner = self.inner.lock().unwrap();
        let (removed, kept): (Vec<_>, Vec<_>) = inner
            .notifications
            .drain(..)
            .partition(|n| n.target_id == target_id);
        inner.notifications = kept;
        Ok(removed
            .into_iter()
            .map(|n| RetractedNotification {
                recipient_id: n.recipient_id,
                notification_id: n.id,
            })
            .collect())
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn chat_participants(&self, chat_id: Uuid) -> AppResult<Vec<Uuid>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.chats.get(&chat_id).cloned().unwrap_or_default())
    }

    async fn insert_message(&self, message: &ChatMessage) -> AppResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner.messages.contains_key(&message.id) {
            return Ok(false);
        }
        inner.messages.insert(
            message.id,
            StoredMessage {
                id: message.id,
                chat_id: message.chat_id,
                sender_id: message.sender_id,
                content: message.content.clone(),
                reply_to_id: message.reply_to_id,
                kind: message.kind,
                shared_post_id: message.shared_post_id,
                created_at: message.created_at,
            },
        );
        Ok(true)
    }

    async fn message_by_id(&self, message_id: Uuid) -> AppResult<Option<ChatMessage>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .messages
            .get(&message_id)
            .map(|m| Self::hydrate_message(&inner, m)))
    }

    async fn messages_page(&self, chat_id: Uuid, take: u32) -> AppResult<ChatMessagesPage> {
        let inner = self.inner.lock().unwrap();
        let participants = inner
            .chats
            .get(&chat_id)
            .cloned()
            .filter(|p| !p.is_empty())
            .ok_or(AppError::NotFound)?;

        let mut stored: Vec<&StoredMessage> = inner
            .messages
            .values()
            .filter(|m| m.chat_id == chat_id)
            .collect();
        stored.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        stored.truncate(take as usize);

        Ok(ChatMessagesPage {
            chat: ChatSummary {
                id: chat_id,
                participants,
            },
            messages: stored
                .into_iter()
                .map(|m| Self::hydrate_message(&inner, m))
                .collect(),
        })
    }

    async fn unread_count(&self, chat_id: Uuid, viewer_id: Uuid) -> AppResult<i64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .messages
            .values()
            .filter(|m| m.chat_id == chat_id && m.sender_id != viewer_id)
            .filter(|m| {
                !inner
                    .seen
                    .contains(&(m.id, TargetType::Message, viewer_id))
            })
            .count() as i64)
    }

    async fn insert_seen(
        &self,
        target_id: Uuid,
        target_type: TargetType,
        user_id: Uuid,
    ) -> AppResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.seen.insert((target_id, target_type, user_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_seen_rows_are_no_ops() {
        let store = MemoryStore::new();
        let msg = Uuid::new_v4();
        let user = Uuid::new_v4();

        assert!(store
            .insert_seen(msg, TargetType::Message, user)
            .await
            .unwrap());
        assert!(!store
            .insert_seen(msg, TargetType::Message, user)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn duplicate_message_insert_is_tolerated() {
        let store = MemoryStore::new();
        let chat = store.add_chat(vec![Uuid::new_v4(), Uuid::new_v4()]);
        let message = ChatMessage {
            id: Uuid::new_v4(),
            chat_id: chat,
            sender_id: Uuid::new_v4(),
            content: "hi".into(),
            reply_to_id: None,
            kind: MessageKind::Text,
            shared_post_id: None,
            likes: vec![],
            seen: false,
            created_at: Utc::now(),
        };

        assert!(store.insert_message(&message).await.unwrap());
        assert!(!store.insert_message(&message).await.unwrap());
        assert_eq!(store.messages_page(chat, 10).await.unwrap().messages.len(), 1);
    }

    #[tokio::test]
    async fn posts_by_authors_orders_newest_first() {
        let store = MemoryStore::new();
        let author = store.add_user("ada");
        let base = Utc::now();
        let old = store.add_post_at(author, "old", base - chrono::Duration::seconds(10));
        let new = store.add_post_at(author, "new", base);

        let posts = store.posts_by_authors(&[author], None, 10).await.unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, new);
        assert_eq!(posts[1].id, old);
    }
}
