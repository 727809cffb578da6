//! Typed payloads for the five pipeline queues.
//!
//! Payload shapes are part of the wire contract with producers; field
//! names stay camelCase and the `type` discriminator carries the job
//! kind. Creation jobs carry their entity ID from the producer so a
//! redelivered job inserts the same row instead of a duplicate.

use crate::models::{MessageKind, TargetType};
use chrono::{DateTime, Utc};
use pulse_queue::{EnqueueOptions, QueueJob};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod queues {
    pub const POSTS: &str = "posts";
    pub const COMMENTS: &str = "comments";
    pub const LIKES: &str = "likes";
    pub const SEEN: &str = "seen";
    pub const MESSAGES: &str = "messages";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum PostJob {
    #[serde(rename_all = "camelCase")]
    Create {
        post_id: Uuid,
        user_id: Uuid,
        post_text: String,
        media: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Update {
        post_id: Uuid,
        user_id: Uuid,
        post_text: String,
    },
    #[serde(rename_all = "camelCase")]
    Delete { post_id: Uuid, user_id: Uuid },
}

impl QueueJob for PostJob {
    const QUEUE: &'static str = queues::POSTS;

    fn kind(&self) -> &'static str {
        match self {
            PostJob::Create { .. } => "create",
            PostJob::Update { .. } => "update",
            PostJob::Delete { .. } => "delete",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum CommentJob {
    #[serde(rename_all = "camelCase")]
    Create {
        comment_id: Uuid,
        post_id: Uuid,
        user_id: Uuid,
        text: String,
        parent_id: Option<Uuid>,
    },
    #[serde(rename_all = "camelCase")]
    Delete { comment_id: Uuid, user_id: Uuid },
}

impl QueueJob for CommentJob {
    const QUEUE: &'static str = queues::COMMENTS;

    fn kind(&self) -> &'static str {
        match self {
            CommentJob::Create { .. } => "create",
            CommentJob::Delete { .. } => "delete",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum LikeJob {
    #[serde(rename_all = "camelCase")]
    Like {
        target_id: Uuid,
        target_type: TargetType,
        user_id: Uuid,
        /// Required when the target is a message.
        chat_id: Option<Uuid>,
    },
    #[serde(rename_all = "camelCase")]
    Unlike {
        target_id: Uuid,
        target_type: TargetType,
        user_id: Uuid,
        chat_id: Option<Uuid>,
    },
}

impl QueueJob for LikeJob {
    const QUEUE: &'static str = queues::LIKES;

    fn kind(&self) -> &'static str {
        match self {
            LikeJob::Like { .. } => "like",
            LikeJob::Unlike { .. } => "unlike",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeenJob {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub target_type: TargetType,
    pub chat_id: Uuid,
    pub user_id: Uuid,
    pub sender_id: Uuid,
}

impl QueueJob for SeenJob {
    const QUEUE: &'static str = queues::SEEN;

    fn kind(&self) -> &'static str {
        "mark-as-seen"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageJob {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub reply_to_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub shared_post_id: Option<Uuid>,
    /// Send time as observed on the request path, so the persisted row
    /// orders identically to the broadcast and the cached snapshot.
    pub created_at: DateTime<Utc>,
}

impl QueueJob for MessageJob {
    const QUEUE: &'static str = queues::MESSAGES;

    fn kind(&self) -> &'static str {
        "persist-message"
    }
}

/// Message persistence gets redelivery; everything else is validated
/// upfront and enqueued fire-and-forget.
pub fn message_enqueue_options(attempts: u32, base_delay_ms: u64) -> EnqueueOptions {
    EnqueueOptions::with_attempts(attempts, base_delay_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_job_wire_shape() {
        let job = PostJob::Create {
            post_id: Uuid::nil(),
            user_id: Uuid::nil(),
            post_text: "hello #rust".into(),
            media: vec!["a.jpg".into()],
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["type"], "create");
        assert_eq!(json["data"]["postText"], "hello #rust");
        assert!(json["data"]["userId"].is_string());
        assert_eq!(job.kind(), "create");
    }

    #[test]
    fn like_job_carries_uppercase_target() {
        let job = LikeJob::Like {
            target_id: Uuid::nil(),
            target_type: TargetType::Message,
            user_id: Uuid::nil(),
            chat_id: Some(Uuid::nil()),
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["data"]["targetType"], "MESSAGE");
        assert_eq!(json["type"], "like");
    }

    #[test]
    fn seen_job_roundtrip() {
        let job = SeenJob {
            id: Uuid::new_v4(),
            target_type: TargetType::Message,
            chat_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["type"], "MESSAGE");
        let back: SeenJob = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, job.id);
        assert_eq!(back.target_type, TargetType::Message);
    }

    #[test]
    fn message_job_queue_and_kind() {
        assert_eq!(MessageJob::QUEUE, "messages");
        let job = MessageJob {
            id: Uuid::nil(),
            chat_id: Uuid::nil(),
            sender_id: Uuid::nil(),
            content: "hi".into(),
            reply_to_id: None,
            kind: MessageKind::Text,
            shared_post_id: None,
            created_at: Utc::now(),
        };
        assert_eq!(job.kind(), "persist-message");
    }

    #[test]
    fn message_options_use_exponential_backoff() {
        let options = message_enqueue_options(3, 2000);
        assert_eq!(options.attempts, 3);
        let json = serde_json::to_value(options.backoff).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "exponential", "delay": 2000})
        );
    }
}
