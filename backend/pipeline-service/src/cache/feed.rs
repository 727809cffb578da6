//! Feed and own-posts read path.
//!
//! Only the first page of a feed is cached, as post IDs hydrated
//! through the per-post cache. Deeper pages always hit the store; they
//! are reached through an explicit cursor and too scattered to be worth
//! caching.

use crate::error::AppResult;
use crate::models::{FeedCacheRecord, FeedPage, PostRecord};
use crate::store::SocialStore;
use chrono::Utc;
use pulse_cache::{ttl, CacheKey, CacheOps};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Cursor fields arrive as strings from transports; an empty string
/// means the same as absent.
pub fn parse_cursor(raw: Option<&str>) -> Option<Uuid> {
    raw.filter(|s| !s.is_empty())
        .and_then(|s| Uuid::parse_str(s).ok())
}

pub struct FeedCacheManager<C> {
    cache: Arc<C>,
    store: Arc<dyn SocialStore>,
}

impl<C> Clone for FeedCacheManager<C> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            store: Arc::clone(&self.store),
        }
    }
}

impl<C: CacheOps> FeedCacheManager<C> {
    pub fn new(cache: Arc<C>, store: Arc<dyn SocialStore>) -> Self {
        Self { cache, store }
    }

    /// The home feed of a user: posts by everyone they follow plus
    /// their own, newest first.
    pub async fn get_feed(
        &self,
        viewer_id: Uuid,
        cursor: Option<Uuid>,
        page_size: u32,
    ) -> AppResult<FeedPage> {
        if cursor.is_none() {
            let key = CacheKey::feed_first(viewer_id, page_size);
            if let Some(page) = self.read_cached_page(&key).await {
                return Ok(page);
            }
        }

        let mut author_ids = self.store.following_ids(viewer_id).await?;
        if !author_ids.contains(&viewer_id) {
            author_ids.push(viewer_id);
        }

        let page = self.fetch_page(&author_ids, cursor, page_size).await?;

        if cursor.is_none() {
            let key = CacheKey::feed_first(viewer_id, page_size);
            self.write_cached_page(&key, &page, ttl::FEED).await;
        } else {
            self.cache_posts(&page.posts, ttl::POST).await;
        }

        Ok(page)
    }

    /// A page of the user's own posts. Unlike the home feed, every page
    /// is cached under its cursor since profile pages are revisited.
    pub async fn get_own_posts(
        &self,
        user_id: Uuid,
        cursor: Option<Uuid>,
        take: u32,
    ) -> AppResult<FeedPage> {
        let key = CacheKey::self_posts(user_id, cursor, take);
        if let Some(page) = self.read_cached_page(&key).await {
            return Ok(page);
        }

        let page = self.fetch_page(&[user_id], cursor, take).await?;
        self.write_cached_page(&key, &page, ttl::SELF_POSTS).await;
        Ok(page)
    }

    /// Repopulate the first page after invalidation so the next read
    /// hits instead of racing a lazy miss.
    pub async fn warm_first_page(&self, viewer_id: Uuid, page_size: u32) -> AppResult<()> {
        self.get_feed(viewer_id, None, page_size).await?;
        Ok(())
    }

    async fn read_cached_page(&self, key: &str) -> Option<FeedPage> {
        let record: FeedCacheRecord = match self.cache.get(key).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Feed cache read failed, falling back to store");
                return None;
            }
        };

        match self.resolve_posts(&record.post_ids).await {
            Ok(posts) => Some(FeedPage {
                posts,
                cursor: record.cursor,
                has_more: record.has_more,
            }),
            Err(e) => {
                warn!(key = %key, error = %e, "Feed hydration failed, falling back to store");
                None
            }
        }
    }

    /// Hydrate cached post IDs through the per-post cache, batch-fetching
    /// misses from the store and splicing them back into their original
    /// slots. Deleted posts drop out; surviving order is preserved.
    async fn resolve_posts(&self, ids: &[Uuid]) -> AppResult<Vec<PostRecord>> {
        let mut slots: Vec<Option<PostRecord>> = Vec::with_capacity(ids.len());
        let mut misses: Vec<(usize, Uuid)> = Vec::new();

        for (idx, id) in ids.iter().enumerate() {
            match self.cache.get::<PostRecord>(&CacheKey::post(*id)).await {
                Ok(Some(post)) => slots.push(Some(post)),
                Ok(None) => {
                    misses.push((idx, *id));
                    slots.push(None);
                }
                Err(e) => {
                    warn!(post_id = %id, error = %e, "Post cache read failed");
                    misses.push((idx, *id));
                    slots.push(None);
                }
            }
        }

        if !misses.is_empty() {
            let miss_ids: Vec<Uuid> = misses.iter().map(|(_, id)| *id).collect();
            let fetched = self.store.posts_by_ids(&miss_ids).await?;
            self.cache_posts(&fetched, ttl::POST).await;

            let mut by_id: HashMap<Uuid, PostRecord> =
                fetched.into_iter().map(|p| (p.id, p)).collect();
            for (idx, id) in misses {
                slots[idx] = by_id.remove(&id);
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }

    /// One page straight from the store. Fetches `page_size + 1` rows;
    /// the overflow row proves more pages exist. When exactly
    /// `page_size` rows come back the overflow is ambiguous, so a cheap
    /// existence probe decides `has_more`.
    async fn fetch_page(
        &self,
        author_ids: &[Uuid],
        cursor: Option<Uuid>,
        page_size: u32,
    ) -> AppResult<FeedPage> {
        // A cursor pointing at a since-deleted post anchors nowhere;
        // restart from the top rather than erroring.
        let anchor = match cursor {
            Some(id) => self
                .store
                .post_by_id(id)
                .await?
                .map(|p| (p.created_at, p.id)),
            None => None,
        };

        let mut posts = self
            .store
            .posts_by_authors(author_ids, anchor, page_size + 1)
            .await?;

        let mut has_more = posts.len() as u32 > page_size;
        if has_more {
            posts.truncate(page_size as usize);
        } else if posts.len() as u32 == page_size {
            if let Some(last) = posts.last() {
                has_more = self
                    .store
                    .has_posts_before(author_ids, (last.created_at, last.id))
                    .await?;
            }
        }

        let cursor = posts.last().map(|p| p.id);
        Ok(FeedPage {
            posts,
            cursor,
            has_more,
        })
    }

    async fn write_cached_page(&self, key: &str, page: &FeedPage, page_ttl: u64) {
        self.cache_posts(&page.posts, ttl::POST).await;

        let record = FeedCacheRecord {
            post_ids: page.posts.iter().map(|p| p.id).collect(),
            cursor: page.cursor,
            has_more: page.has_more,
            cached_at: Utc::now(),
        };
        if let Err(e) = self.cache.set(key, &record, page_ttl).await {
            warn!(key = %key, error = %e, "Feed cache write failed");
        }
    }

    async fn cache_posts(&self, posts: &[PostRecord], post_ttl: u64) {
        if posts.is_empty() {
            return;
        }
        let keys: Vec<String> = posts.iter().map(|p| CacheKey::post(p.id)).collect();
        let items: Vec<(&str, &PostRecord, u64)> = keys
            .iter()
            .zip(posts.iter())
            .map(|(key, post)| (key.as_str(), post, post_ttl))
            .collect();
        if let Err(e) = self.cache.pipeline_set(&items).await {
            warn!(count = posts.len(), error = %e, "Post cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cursor_treats_empty_as_absent() {
        assert_eq!(parse_cursor(None), None);
        assert_eq!(parse_cursor(Some("")), None);
        assert_eq!(parse_cursor(Some("not-a-uuid")), None);

        let id = Uuid::new_v4();
        assert_eq!(parse_cursor(Some(&id.to_string())), Some(id));
    }
}
