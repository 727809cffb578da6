use crate::cache::FollowListCacheManager;
use crate::error::{AppError, AppResult};
use crate::invalidation::CacheInvalidator;
use crate::models::FollowListPage;
use crate::store::{FollowListKind, SocialStore};
use pulse_cache::CacheOps;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct FollowService<C> {
    store: Arc<dyn SocialStore>,
    follow_cache: FollowListCacheManager<C>,
    invalidator: CacheInvalidator<C>,
}

impl<C: CacheOps> FollowService<C> {
    pub fn new(
        store: Arc<dyn SocialStore>,
        follow_cache: FollowListCacheManager<C>,
        invalidator: CacheInvalidator<C>,
    ) -> Self {
        Self {
            store,
            follow_cache,
            invalidator,
        }
    }

    pub async fn followers(
        &self,
        user_id: Uuid,
        cursor: u32,
        limit: u32,
    ) -> AppResult<FollowListPage> {
        self.follow_cache
            .follow_list(user_id, FollowListKind::Followers, cursor, limit)
            .await
    }

    pub async fn following(
        &self,
        user_id: Uuid,
        cursor: u32,
        limit: u32,
    ) -> AppResult<FollowListPage> {
        self.follow_cache
            .follow_list(user_id, FollowListKind::Following, cursor, limit)
            .await
    }

    pub async fn follow(&self, follower_id: Uuid, followee_id: Uuid) -> AppResult<()> {
        if follower_id == followee_id {
            return Err(AppError::BadRequest("cannot follow yourself".into()));
        }

        let inserted = self.store.insert_follow(follower_id, followee_id).await?;
        if inserted {
            info!(follower = %follower_id, followee = %followee_id, "Follow created");
        }
        self.refresh_after_follow_change(follower_id, followee_id)
            .await;
        Ok(())
    }

    pub async fn unfollow(&self, follower_id: Uuid, followee_id: Uuid) -> AppResult<()> {
        let removed = self.store.delete_follow(follower_id, followee_id).await?;
        if removed {
            info!(follower = %follower_id, followee = %followee_id, "Follow removed");
        }
        self.refresh_after_follow_change(follower_id, followee_id)
            .await;
        Ok(())
    }

    /// Both users' follow lists changed, and the follower's feed now
    /// has a different author set. All cache work is best-effort.
    async fn refresh_after_follow_change(&self, follower_id: Uuid, followee_id: Uuid) {
        for user_id in [follower_id, followee_id] {
            if let Err(e) = self.follow_cache.invalidate_and_warm_both(user_id).await {
                warn!(user_id = %user_id, error = %e, "Follow cache refresh failed");
            }
        }
        if let Err(e) = self.invalidator.invalidate_feed_for_user(follower_id).await {
            warn!(user_id = %follower_id, error = %e, "Feed invalidation failed");
        }
    }
}
