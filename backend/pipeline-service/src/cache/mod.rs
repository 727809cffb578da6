//! Cache-backed read paths.
//!
//! Each manager owns one key family and is the only component that
//! reads or writes it. Cache failures never fail a read: every manager
//! degrades to the backing store and logs.

mod chat;
mod feed;
mod follow;

pub use chat::ChatCacheManager;
pub use feed::{parse_cursor, FeedCacheManager};
pub use follow::FollowListCacheManager;
