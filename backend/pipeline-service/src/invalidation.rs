//! Explicit cache invalidation.
//!
//! The only component allowed to issue pattern deletes against feed
//! keys. Everyone else invalidates single keys through their manager or
//! goes through here.

use crate::error::AppResult;
use crate::store::SocialStore;
use pulse_cache::{CacheKey, CacheOps};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Upper bound on the follower fan-out of one invalidation. Beyond it,
/// remaining followers keep stale entries until TTL expiry.
const MAX_FANOUT_FOLLOWERS: usize = 10_000;

pub struct CacheInvalidator<C> {
    cache: Arc<C>,
    store: Arc<dyn SocialStore>,
}

impl<C> Clone for CacheInvalidator<C> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            store: Arc::clone(&self.store),
        }
    }
}

impl<C: CacheOps> CacheInvalidator<C> {
    pub fn new(cache: Arc<C>, store: Arc<dyn SocialStore>) -> Self {
        Self { cache, store }
    }

    /// Drop the denormalized copy of a single post. Feed pages keep
    /// their ID lists; hydration re-fetches the post on next read.
    pub async fn invalidate_post(&self, post_id: Uuid) -> AppResult<()> {
        self.cache.del(&CacheKey::post(post_id)).await?;
        Ok(())
    }

    /// Fan out over an author's followers and drop every cached feed
    /// page containing (or about to contain) the author's posts, plus
    /// the author's own-posts pages. Returns the number of keys dropped.
    ///
    /// Per-follower failures are logged and skipped; the TTL is the
    /// backstop for anything missed.
    pub async fn invalidate_feeds_for_author(&self, author_id: Uuid) -> AppResult<usize> {
        let mut user_ids = self.store.follower_ids(author_id).await?;
        if !user_ids.contains(&author_id) {
            user_ids.push(author_id);
        }
        if user_ids.len() > MAX_FANOUT_FOLLOWERS {
            info!(
                author_id = %author_id,
                followers = user_ids.len(),
                cap = MAX_FANOUT_FOLLOWERS,
                "Invalidation fan-out capped"
            );
            user_ids.truncate(MAX_FANOUT_FOLLOWERS);
        }

        let mut deleted = 0;
        for user_id in &user_ids {
            match self.cache.scan_del(&CacheKey::feed_pattern(*user_id)).await {
                Ok(count) => deleted += count,
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Feed invalidation failed for user")
                }
            }
        }

        match self
            .cache
            .scan_del(&CacheKey::self_posts_pattern(author_id))
            .await
        {
            Ok(count) => deleted += count,
            Err(e) => {
                warn!(author_id = %author_id, error = %e, "Own-posts invalidation failed")
            }
        }

        Ok(deleted)
    }

    /// Drop one user's cached feed pages, e.g. after their follow graph
    /// changed and the feed composition with it.
    pub async fn invalidate_feed_for_user(&self, user_id: Uuid) -> AppResult<usize> {
        let deleted = self.cache.scan_del(&CacheKey::feed_pattern(user_id)).await?;
        Ok(deleted)
    }
}
