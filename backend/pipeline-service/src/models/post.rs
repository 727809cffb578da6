use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Author block denormalized onto posts, comments and follow lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// A post as served to feeds: author, media, counts and the earliest
/// comment for preview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: Uuid,
    pub author: UserSummary,
    pub text: String,
    pub media: Vec<String>,
    pub like_count: i64,
    pub comment_count: i64,
    pub first_comment: Option<CommentSummary>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentSummary {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub text: String,
    /// Set when the comment is a reply to another comment.
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

pub struct NewPost {
    pub id: Uuid,
    pub author_id: Uuid,
    pub text: String,
    pub media: Vec<String>,
}

pub struct NewComment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub text: String,
    pub parent_id: Option<Uuid>,
}

/// Cached shape of a feed first page: IDs only, hydrated through the
/// per-post cache on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedCacheRecord {
    pub post_ids: Vec<Uuid>,
    pub cursor: Option<Uuid>,
    pub has_more: bool,
    pub cached_at: DateTime<Utc>,
}

/// A hydrated feed page as returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct FeedPage {
    pub posts: Vec<PostRecord>,
    pub cursor: Option<Uuid>,
    pub has_more: bool,
}

/// One page of a followers or following list. The cursor is a row
/// offset, not an entity ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowListPage {
    pub users: Vec<UserSummary>,
    pub next_cursor: Option<u32>,
}
