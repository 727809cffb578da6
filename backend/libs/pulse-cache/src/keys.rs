//! Cache key schema
//!
//! All components must use these builders. The formats are wire-compatible
//! with the existing store, so they must not change shape:
//!
//! - `post:{postId}`
//! - `feed:{userId}:first:{pageSize}`
//! - `self:{userId}:{cursor|"first"}:{take}`
//! - `followers:{userId}:first:{limit}` / `following:{userId}:first:{limit}`
//! - `messages:{chatId}`
//! - `lastMessage:{chatId}`
//! - `message:{id}`

use uuid::Uuid;

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    // ============= Post Keys =============

    /// Denormalized post with counts.
    pub fn post(post_id: Uuid) -> String {
        format!("post:{}", post_id)
    }

    // ============= Feed Keys =============

    /// First page of a user's home feed at a given page size.
    pub fn feed_first(user_id: Uuid, page_size: u32) -> String {
        format!("feed:{}:first:{}", user_id, page_size)
    }

    /// Pattern for all feed pages of a user.
    pub fn feed_pattern(user_id: Uuid) -> String {
        format!("feed:{}:*", user_id)
    }

    /// A page of a user's own posts. `cursor` is the anchor post id,
    /// or `None` for the first page.
    pub fn self_posts(user_id: Uuid, cursor: Option<Uuid>, take: u32) -> String {
        match cursor {
            Some(anchor) => format!("self:{}:{}:{}", user_id, anchor, take),
            None => format!("self:{}:first:{}", user_id, take),
        }
    }

    /// Pattern for all own-posts pages of a user.
    pub fn self_posts_pattern(user_id: Uuid) -> String {
        format!("self:{}:*", user_id)
    }

    // ============= Follow Keys =============

    /// First page of a user's follower list at a given limit.
    pub fn followers_first(user_id: Uuid, limit: u32) -> String {
        format!("followers:{}:first:{}", user_id, limit)
    }

    /// First page of a user's following list at a given limit.
    pub fn following_first(user_id: Uuid, limit: u32) -> String {
        format!("following:{}:first:{}", user_id, limit)
    }

    pub fn followers_pattern(user_id: Uuid) -> String {
        format!("followers:{}:*", user_id)
    }

    pub fn following_pattern(user_id: Uuid) -> String {
        format!("following:{}:*", user_id)
    }

    // ============= Chat Keys =============

    /// Cached first page of a chat's messages plus chat metadata.
    pub fn chat_messages(chat_id: Uuid) -> String {
        format!("messages:{}", chat_id)
    }

    /// Most recent message snapshot for a chat.
    pub fn last_message(chat_id: Uuid) -> String {
        format!("lastMessage:{}", chat_id)
    }

    /// Ephemeral pre-persistence message snapshot.
    pub fn message(message_id: Uuid) -> String {
        format!("message:{}", message_id)
    }

    // ============= Utility =============

    /// Extract the entity prefix from a key, for metrics labeling.
    pub fn entity_type(key: &str) -> &str {
        key.split(':').next().filter(|s| !s.is_empty()).unwrap_or("unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> Uuid {
        Uuid::parse_str(s).unwrap()
    }

    #[test]
    fn post_key_format() {
        let id = uid("550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(
            CacheKey::post(id),
            "post:550e8400-e29b-41d4-a716-446655440000"
        );
    }

    #[test]
    fn feed_key_format() {
        let id = uid("550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(
            CacheKey::feed_first(id, 5),
            "feed:550e8400-e29b-41d4-a716-446655440000:first:5"
        );
        assert_eq!(
            CacheKey::feed_pattern(id),
            "feed:550e8400-e29b-41d4-a716-446655440000:*"
        );
    }

    #[test]
    fn self_posts_key_uses_first_sentinel() {
        let user = uid("550e8400-e29b-41d4-a716-446655440000");
        let anchor = uid("660e8400-e29b-41d4-a716-446655440001");
        assert_eq!(
            CacheKey::self_posts(user, None, 10),
            "self:550e8400-e29b-41d4-a716-446655440000:first:10"
        );
        assert_eq!(
            CacheKey::self_posts(user, Some(anchor), 10),
            format!("self:{}:{}:10", user, anchor)
        );
    }

    #[test]
    fn follow_key_formats() {
        let id = uid("550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(
            CacheKey::followers_first(id, 20),
            format!("followers:{}:first:20", id)
        );
        assert_eq!(
            CacheKey::following_first(id, 20),
            format!("following:{}:first:20", id)
        );
    }

    #[test]
    fn chat_key_formats() {
        let id = uid("770e8400-e29b-41d4-a716-446655440002");
        assert_eq!(CacheKey::chat_messages(id), format!("messages:{}", id));
        assert_eq!(CacheKey::last_message(id), format!("lastMessage:{}", id));
        assert_eq!(CacheKey::message(id), format!("message:{}", id));
    }

    #[test]
    fn entity_type_extraction() {
        assert_eq!(CacheKey::entity_type("post:123"), "post");
        assert_eq!(CacheKey::entity_type("lastMessage:abc"), "lastMessage");
        assert_eq!(CacheKey::entity_type(""), "unknown");
    }
}
