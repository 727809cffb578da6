//! Follower/following list read path.
//!
//! Cursors here are row offsets, not entity IDs, and only the first
//! page (offset 0) is cached. Follow graphs churn, so these entries get
//! the short TTL and are refreshed eagerly on every follow change.

use crate::error::AppResult;
use crate::models::FollowListPage;
use crate::store::{FollowListKind, SocialStore};
use pulse_cache::{ttl, CacheKey, CacheOps};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

pub struct FollowListCacheManager<C> {
    cache: Arc<C>,
    store: Arc<dyn SocialStore>,
    /// Page size used when warming after invalidation.
    default_limit: u32,
}

impl<C> Clone for FollowListCacheManager<C> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            store: Arc::clone(&self.store),
            default_limit: self.default_limit,
        }
    }
}

impl<C: CacheOps> FollowListCacheManager<C> {
    pub fn new(cache: Arc<C>, store: Arc<dyn SocialStore>, default_limit: u32) -> Self {
        Self {
            cache,
            store,
            default_limit,
        }
    }

    pub async fn follow_list(
        &self,
        user_id: Uuid,
        kind: FollowListKind,
        cursor: u32,
        limit: u32,
    ) -> AppResult<FollowListPage> {
        if cursor == 0 {
            let key = first_page_key(user_id, kind, limit);
            match self.cache.get::<FollowListPage>(&key).await {
                Ok(Some(page)) => return Ok(page),
                Ok(None) => {}
                Err(e) => {
                    warn!(key = %key, error = %e, "Follow cache read failed, falling back to store");
                }
            }

            let page = self.fetch_page(user_id, kind, 0, limit).await?;
            if let Err(e) = self.cache.set(&key, &page, ttl::FOLLOW).await {
                warn!(key = %key, error = %e, "Follow cache write failed");
            }
            return Ok(page);
        }

        self.fetch_page(user_id, kind, cursor, limit).await
    }

    /// Drop every cached page of both of the user's lists, then re-read
    /// the first pages so the caches come back warm. Used after any
    /// follow or unfollow touching the user.
    pub async fn invalidate_and_warm_both(&self, user_id: Uuid) -> AppResult<()> {
        for pattern in [
            CacheKey::followers_pattern(user_id),
            CacheKey::following_pattern(user_id),
        ] {
            if let Err(e) = self.cache.scan_del(&pattern).await {
                warn!(pattern = %pattern, error = %e, "Follow cache invalidation failed");
            }
        }

        self.follow_list(user_id, FollowListKind::Followers, 0, self.default_limit)
            .await?;
        self.follow_list(user_id, FollowListKind::Following, 0, self.default_limit)
            .await?;
        Ok(())
    }

    async fn fetch_page(
        &self,
        user_id: Uuid,
        kind: FollowListKind,
        skip: u32,
        limit: u32,
    ) -> AppResult<FollowListPage> {
        let mut users = self
            .store
            .follow_page(user_id, kind, skip, limit + 1)
            .await?;

        let next_cursor = if users.len() as u32 > limit {
            users.truncate(limit as usize);
            Some(skip + limit)
        } else {
            None
        };

        Ok(FollowListPage { users, next_cursor })
    }
}

fn first_page_key(user_id: Uuid, kind: FollowListKind, limit: u32) -> String {
    match kind {
        FollowListKind::Followers => CacheKey::followers_first(user_id, limit),
        FollowListKind::Following => CacheKey::following_first(user_id, limit),
    }
}
