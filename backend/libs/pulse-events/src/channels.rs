//! Broadcast channel and event naming
//!
//! Channel names are part of the wire contract with connected clients and
//! must not change shape:
//!
//! - `private-chat-{chatId}`: `new-message`, `typing`, `message-seen`,
//!   `message-like-updated`
//! - `private-user-{userId}`: `message-seen`, `message-like-updated`
//!   (mirrors chat events onto the user's background channel)
//! - `notification-{userId}`: `new-noti`

use uuid::Uuid;

/// Event name constants.
pub mod event {
    pub const NEW_MESSAGE: &str = "new-message";
    pub const TYPING: &str = "typing";
    pub const MESSAGE_SEEN: &str = "message-seen";
    pub const MESSAGE_LIKE_UPDATED: &str = "message-like-updated";
    pub const NEW_NOTIFICATION: &str = "new-noti";
}

/// Channel shared by everyone currently viewing a chat.
pub fn chat_channel(chat_id: Uuid) -> String {
    format!("private-chat-{}", chat_id)
}

/// A user's background channel; carries chat events for chats the user
/// is not currently viewing.
pub fn user_channel(user_id: Uuid) -> String {
    format!("private-user-{}", user_id)
}

/// A user's notification channel.
pub fn notification_channel(user_id: Uuid) -> String {
    format!("notification-{}", user_id)
}

/// Payload for retracting a previously delivered notification.
pub fn notification_retraction(notification_id: Uuid) -> serde_json::Value {
    serde_json::json!({ "deleted": true, "id": notification_id })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_name_formats() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(
            chat_channel(id),
            "private-chat-550e8400-e29b-41d4-a716-446655440000"
        );
        assert_eq!(
            user_channel(id),
            "private-user-550e8400-e29b-41d4-a716-446655440000"
        );
        assert_eq!(
            notification_channel(id),
            "notification-550e8400-e29b-41d4-a716-446655440000"
        );
    }

    #[test]
    fn retraction_payload_shape() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let payload = notification_retraction(id);
        assert_eq!(payload["deleted"], true);
        assert_eq!(payload["id"], id.to_string());
    }
}
