use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Text,
    SharedPost,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "TEXT",
            MessageKind::SharedPost => "SHARED_POST",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub reply_to_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub shared_post_id: Option<Uuid>,
    /// IDs of users who liked the message.
    pub likes: Vec<Uuid>,
    /// Whether any participant other than the sender has seen it.
    pub seen: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: Uuid,
    pub participants: Vec<Uuid>,
}

/// Cached first page of a chat: the chat metadata plus its most recent
/// messages, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessagesPage {
    pub chat: ChatSummary,
    pub messages: Vec<ChatMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_wire_shape_is_camel_case() {
        let msg = ChatMessage {
            id: Uuid::nil(),
            chat_id: Uuid::nil(),
            sender_id: Uuid::nil(),
            content: "hi".into(),
            reply_to_id: None,
            kind: MessageKind::Text,
            shared_post_id: None,
            likes: vec![],
            seen: false,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("chatId").is_some());
        assert!(json.get("replyToId").is_some());
        assert_eq!(json["type"], "TEXT");
    }
}
