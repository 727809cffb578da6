//! Domain types shared by stores, cache managers, workers and services.

mod chat;
mod notification;
mod post;

pub use chat::{ChatMessage, ChatMessagesPage, ChatSummary, MessageKind};
pub use notification::{NewNotification, NotificationKind, NotificationRecord};
pub use post::{
    CommentSummary, FeedCacheRecord, FeedPage, FollowListPage, NewComment, NewPost, PostRecord,
    UserSummary,
};

use serde::{Deserialize, Serialize};

/// What a like or a seen-ledger row points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TargetType {
    Message,
    Post,
    Comment,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Message => "MESSAGE",
            TargetType::Post => "POST",
            TargetType::Comment => "COMMENT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_type_wire_values_are_uppercase() {
        assert_eq!(
            serde_json::to_value(TargetType::Message).unwrap(),
            "MESSAGE"
        );
        let parsed: TargetType = serde_json::from_str("\"POST\"").unwrap();
        assert_eq!(parsed, TargetType::Post);
    }
}
