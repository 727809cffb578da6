//! sqlx-backed store over the externally owned relational schema.
//!
//! Queries are runtime-checked (`sqlx::query_as`), so this crate builds
//! without a live database.

use super::{ChatStore, FollowListKind, RetractedNotification, SocialStore};
use crate::error::{AppError, AppResult};
use crate::models::{
    ChatMessage, ChatMessagesPage, ChatSummary, CommentSummary, MessageKind, NewComment,
    NewNotification, NewPost, NotificationKind, NotificationRecord, PostRecord, TargetType,
    UserSummary,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn hydrate_posts(&self, rows: Vec<PostRow>) -> AppResult<Vec<PostRecord>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let first_comments: Vec<CommentRow> = sqlx::query_as(
            r#"
            SELECT DISTINCT ON (c.post_id)
                   c.id, c.post_id, c.author_id, c.text, c.parent_id, c.created_at
            FROM comments c
            WHERE c.post_id = ANY($1)
            ORDER BY c.post_id, c.created_at ASC, c.id ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_post: HashMap<Uuid, CommentSummary> = first_comments
            .into_iter()
            .map(|c| (c.post_id, c.into()))
            .collect();

        Ok(rows
            .into_iter()
            .map(|row| {
                let first_comment = by_post.remove(&row.id);
                row.into_record(first_comment)
            })
            .collect())
    }
}

#[derive(sqlx::FromRow)]
struct PostRow {
    id: Uuid,
    author_id: Uuid,
    username: String,
    avatar_url: Option<String>,
    text: String,
    media: Vec<String>,
    like_count: i64,
    comment_count: i64,
    created_at: DateTime<Utc>,
}

impl PostRow {
    fn into_record(self, first_comment: Option<CommentSummary>) -> PostRecord {
        PostRecord {
            id: self.id,
            author: UserSummary {
                id: self.author_id,
                username: self.username,
                avatar_url: self.avatar_url,
            },
            text: self.text,
            media: self.media,
            like_count: self.like_count,
            comment_count: self.comment_count,
            first_comment,
            created_at: self.created_at,
        }
    }
}

const POST_COLUMNS: &str = r#"
    p.id, p.author_id, u.username, u.avatar_url, p.text, p.media, p.created_at,
    (SELECT COUNT(*) FROM likes l
     WHERE l.target_id = p.id AND l.target_type = 'POST') AS like_count,
    (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count
"#;

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: Uuid,
    post_id: Uuid,
    author_id: Uuid,
    text: String,
    parent_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl From<CommentRow> for CommentSummary {
    fn from(row: CommentRow) -> Self {
        CommentSummary {
            id: row.id,
            post_id: row.post_id,
            author_id: row.author_id,
            text: row.text,
            parent_id: row.parent_id,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    chat_id: Uuid,
    sender_id: Uuid,
    content: String,
    reply_to_id: Option<Uuid>,
    kind: String,
    shared_post_id: Option<Uuid>,
    seen: bool,
    created_at: DateTime<Utc>,
}

impl MessageRow {
    fn into_message(self, likes: Vec<Uuid>) -> ChatMessage {
        ChatMessage {
            id: self.id,
            chat_id: self.chat_id,
            sender_id: self.sender_id,
            content: self.content,
            reply_to_id: self.reply_to_id,
            kind: message_kind_from_str(&self.kind),
            shared_post_id: self.shared_post_id,
            likes,
            seen: self.seen,
            created_at: self.created_at,
        }
    }
}

fn message_kind_from_str(raw: &str) -> MessageKind {
    match raw {
        "SHARED_POST" => MessageKind::SharedPost,
        _ => MessageKind::Text,
    }
}

#[async_trait]
impl SocialStore for PgStore {
    async fn following_ids(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar("SELECT followee_id FROM follows WHERE follower_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn follower_ids(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar("SELECT follower_id FROM follows WHERE followee_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn follow_page(
        &self,
        user_id: Uuid,
        kind: FollowListKind,
        skip: u32,
        take: u32,
    ) -> AppResult<Vec<UserSummary>> {
        let sql = match kind {
            FollowListKind::Followers => {
                r#"
                SELECT u.id, u.username, u.avatar_url
                FROM follows f JOIN users u ON u.id = f.follower_id
                WHERE f.followee_id = $1
                ORDER BY f.created_at ASC
                OFFSET $2 LIMIT $3
                "#
            }
            FollowListKind::Following => {
                r#"
                SELECT u.id, u.username, u.avatar_url
                FROM follows f JOIN users u ON u.id = f.followee_id
                WHERE f.follower_id = $1
                ORDER BY f.created_at ASC
                OFFSET $2 LIMIT $3
                "#
            }
        };

        let rows: Vec<(Uuid, String, Option<String>)> = sqlx::query_as(sql)
            .bind(user_id)
            .bind(skip as i64)
            .bind(take as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(id, username, avatar_url)| UserSummary {
                id,
                username,
                avatar_url,
            })
            .collect())
    }

    async fn insert_follow(&self, follower_id: Uuid, followee_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO follows (follower_id, followee_id, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (follower_id, followee_id) DO NOTHING
            "#,
        )
        .bind(follower_id)
        .bind(followee_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_follow(&self, follower_id: Uuid, followee_id: Uuid) -> AppResult<bool> {
        let result =
            sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2")
                .bind(follower_id)
                .bind(followee_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn posts_by_authors(
        &self,
        author_ids: &[Uuid],
        anchor: Option<(DateTime<Utc>, Uuid)>,
        take: u32,
    ) -> AppResult<Vec<PostRecord>> {
        // Row comparison matches the ORDER BY, so ties on created_at
        // fall through to the id and no row is skipped at a boundary
        let sql = format!(
            r#"
            SELECT {POST_COLUMNS}
            FROM posts p JOIN users u ON u.id = p.author_id
            WHERE p.author_id = ANY($1)
              AND ($2::timestamptz IS NULL OR (p.created_at, p.id) < ($2, $3))
            ORDER BY p.created_at DESC, p.id DESC
            LIMIT $4
            "#
        );

        let (anchor_at, anchor_id) = anchor.unzip();
        let rows: Vec<PostRow> = sqlx::query_as(&sql)
            .bind(author_ids)
            .bind(anchor_at)
            .bind(anchor_id)
            .bind(take as i64)
            .fetch_all(&self.pool)
            .await?;

        self.hydrate_posts(rows).await
    }

    async fn has_posts_before(
        &self,
        author_ids: &[Uuid],
        anchor: (DateTime<Utc>, Uuid),
    ) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM posts p
                WHERE p.author_id = ANY($1) AND (p.created_at, p.id) < ($2, $3)
            )
            "#,
        )
        .bind(author_ids)
        .bind(anchor.0)
        .bind(anchor.1)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn posts_by_ids(&self, ids: &[Uuid]) -> AppResult<Vec<PostRecord>> {
        let sql = format!(
            r#"
            SELECT {POST_COLUMNS}
            FROM posts p JOIN users u ON u.id = p.author_id
            WHERE p.id = ANY($1)
            "#
        );

        let rows: Vec<PostRow> = sqlx::query_as(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        self.hydrate_posts(rows).await
    }

    async fn post_by_id(&self, id: Uuid) -> AppResult<Option<PostRecord>> {
        Ok(self.posts_by_ids(&[id]).await?.into_iter().next())
    }

    async fn insert_post(&self, new_post: NewPost) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO posts (id, author_id, text, media, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(new_post.id)
        .bind(new_post.author_id)
        .bind(&new_post.text)
        .bind(&new_post.media)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_post_text(
        &self,
        post_id: Uuid,
        author_id: Uuid,
        text: String,
    ) -> AppResult<()> {
        let owner: Option<Uuid> = sqlx::query_scalar("SELECT author_id FROM posts WHERE id = $1")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?;
        match owner {
            None => return Err(AppError::NotFound),
            Some(owner) if owner != author_id => return Err(AppError::Forbidden),
            Some(_) => {}
        }

        sqlx::query("UPDATE posts SET text = $2 WHERE id = $1")
            .bind(post_id)
            .bind(&text)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_post(&self, post_id: Uuid, author_id: Uuid) -> AppResult<()> {
        let owner: Option<Uuid> = sqlx::query_scalar("SELECT author_id FROM posts WHERE id = $1")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?;
        match owner {
            None => return Err(AppError::NotFound),
            Some(owner) if owner != author_id => return Err(AppError::Forbidden),
            Some(_) => {}
        }

        sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_trends(&self, tags: &[String]) -> AppResult<()> {
        for tag in tags {
            sqlx::query(
                r#"
                INSERT INTO trends (tag, uses, last_used_at)
                VALUES ($1, 1, NOW())
                ON CONFLICT (tag)
                DO UPDATE SET uses = trends.uses + 1, last_used_at = NOW()
                "#,
            )
            .bind(tag)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn insert_comment(&self, new_comment: NewComment) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO comments (id, post_id, author_id, text, parent_id, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(new_comment.id)
        .bind(new_comment.post_id)
        .bind(new_comment.author_id)
        .bind(&new_comment.text)
        .bind(new_comment.parent_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn comment_by_id(&self, comment_id: Uuid) -> AppResult<Option<CommentSummary>> {
        let row: Option<CommentRow> = sqlx::query_as(
            "SELECT id, post_id, author_id, text, parent_id, created_at FROM comments WHERE id = $1",
        )
        .bind(comment_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn delete_comment(&self, comment_id: Uuid, author_id: Uuid) -> AppResult<()> {
        let owner: Option<Uuid> =
            sqlx::query_scalar("SELECT author_id FROM comments WHERE id = $1")
                .bind(comment_id)
                .fetch_optional(&self.pool)
                .await?;
        match owner {
            None => return Err(AppError::NotFound),
            Some(owner) if owner != author_id => return Err(AppError::Forbidden),
            Some(_) => {}
        }

        sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(comment_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_like(
        &self,
        target_id: Uuid,
        target_type: TargetType,
        user_id: Uuid,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO likes (target_id, target_type, user_id, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (target_id, target_type, user_id) DO NOTHING
            "#,
        )
        .bind(target_id)
        .bind(target_type.as_str())
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_like(
        &self,
        target_id: Uuid,
        target_type: TargetType,
        user_id: Uuid,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "DELETE FROM likes WHERE target_id = $1 AND target_type = $2 AND user_id = $3",
        )
        .bind(target_id)
        .bind(target_type.as_str())
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn like_ids(&self, target_id: Uuid, target_type: TargetType) -> AppResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT user_id FROM likes
            WHERE target_id = $1 AND target_type = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(target_id)
        .bind(target_type.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
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

        sqlx::query(
            r#"
            INSERT INTO notifications (id, recipient_id, actor_id, kind, target_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id)
        .bind(record.recipient_id)
        .bind(record.actor_id)
        .bind(record.kind.as_str())
        .bind(record.target_id)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn delete_notifications(
        &self,
        actor_id: Uuid,
        kind: NotificationKind,
        target_id: Uuid,
    ) -> AppResult<Vec<RetractedNotification>> {
        let rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
            r#"
            DELETE FROM notifications
            WHERE actor_id = $1 AND kind = $2 AND target_id = $3
            RETURNING recipient_id, id
            "#,
        )
        .bind(actor_id)
        .bind(kind.as_str())
        .bind(target_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(recipient_id, notification_id)| RetractedNotification {
                recipient_id,
                notification_id,
            })
            .collect())
    }

    async fn delete_notifications_for_target(
        &self,
        target_id: Uuid,
    ) -> AppResult<Vec<RetractedNotification>> {
        let rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
            "DELETE FROM notifications WHERE target_id = $1 RETURNING recipient_id, id",
        )
        .bind(target_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(recipient_id, notification_id)| RetractedNotification {
                recipient_id,
                notification_id,
            })
            .collect())
    }
}

#[async_trait]
impl ChatStore for PgStore {
    async fn chat_participants(&self, chat_id: Uuid) -> AppResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar("SELECT user_id FROM chat_participants WHERE chat_id = $1")
            .bind(chat_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn insert_message(&self, message: &ChatMessage) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO messages
                (id, chat_id, sender_id, content, reply_to_id, kind, shared_post_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(message.id)
        .bind(message.chat_id)
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(message.reply_to_id)
        .bind(message.kind.as_str())
        .bind(message.shared_post_id)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn message_by_id(&self, message_id: Uuid) -> AppResult<Option<ChatMessage>> {
        let row: Option<MessageRow> = sqlx::query_as(
            r#"
            SELECT m.id, m.chat_id, m.sender_id, m.content, m.reply_to_id,
                   m.kind, m.shared_post_id, m.created_at,
                   EXISTS (
                       SELECT 1 FROM seen s
                       WHERE s.target_id = m.id AND s.target_type = 'MESSAGE'
                         AND s.user_id <> m.sender_id
                   ) AS seen
            FROM messages m WHERE m.id = $1
            "#,
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let likes = self.like_ids(row.id, TargetType::Message).await?;
        Ok(Some(row.into_message(likes)))
    }

    async fn messages_page(&self, chat_id: Uuid, take: u32) -> AppResult<ChatMessagesPage> {
        let participants = self.chat_participants(chat_id).await?;
        if participants.is_empty() {
            return Err(AppError::NotFound);
        }

        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT m.id, m.chat_id, m.sender_id, m.content, m.reply_to_id,
                   m.kind, m.shared_post_id, m.created_at,
                   EXISTS (
                       SELECT 1 FROM seen s
                       WHERE s.target_id = m.id AND s.target_type = 'MESSAGE'
                         AND s.user_id <> m.sender_id
                   ) AS seen
            FROM messages m
            WHERE m.chat_id = $1
            ORDER BY m.created_at DESC, m.id DESC
            LIMIT $2
            "#,
        )
        .bind(chat_id)
        .bind(take as i64)
        .fetch_all(&self.pool)
        .await?;

        let message_ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let like_rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
            r#"
            SELECT target_id, user_id FROM likes
            WHERE target_id = ANY($1) AND target_type = 'MESSAGE'
            ORDER BY created_at ASC
            "#,
        )
        .bind(&message_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut likes_by_message: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for (message_id, user_id) in like_rows {
            likes_by_message.entry(message_id).or_default().push(user_id);
        }

        let messages = rows
            .into_iter()
            .map(|row| {
                let likes = likes_by_message.remove(&row.id).unwrap_or_default();
                row.into_message(likes)
            })
            .collect();

        Ok(ChatMessagesPage {
            chat: ChatSummary {
                id: chat_id,
                participants,
            },
            messages,
        })
    }

    async fn unread_count(&self, chat_id: Uuid, viewer_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM messages m
            WHERE m.chat_id = $1 AND m.sender_id <> $2
              AND NOT EXISTS (
                  SELECT 1 FROM seen s
                  WHERE s.target_id = m.id AND s.target_type = 'MESSAGE' AND s.user_id = $2
              )
            "#,
        )
        .bind(chat_id)
        .bind(viewer_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn insert_seen(
        &self,
        target_id: Uuid,
        target_type: TargetType,
        user_id: Uuid,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO seen (target_id, target_type, user_id, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (target_id, target_type, user_id) DO NOTHING
            "#,
        )
        .bind(target_id)
        .bind(target_type.as_str())
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
