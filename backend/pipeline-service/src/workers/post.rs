use crate::cache::FeedCacheManager;
use crate::invalidation::CacheInvalidator;
use crate::jobs::{queues, PostJob};
use crate::models::NewPost;
use crate::store::SocialStore;
use async_trait::async_trait;
use pulse_cache::CacheOps;
use pulse_queue::{JobEnvelope, JobError, JobHandler};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct PostWorker<C> {
    store: Arc<dyn SocialStore>,
    invalidator: CacheInvalidator<C>,
    feed: FeedCacheManager<C>,
    feed_page_size: u32,
}

impl<C: CacheOps> PostWorker<C> {
    pub fn new(
        store: Arc<dyn SocialStore>,
        invalidator: CacheInvalidator<C>,
        feed: FeedCacheManager<C>,
        feed_page_size: u32,
    ) -> Self {
        Self {
            store,
            invalidator,
            feed,
            feed_page_size,
        }
    }

    async fn create(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        post_text: String,
        media: Vec<String>,
    ) -> Result<(), JobError> {
        let tags = extract_hashtags(&post_text);

        let inserted = self
            .store
            .insert_post(NewPost {
                id: post_id,
                author_id: user_id,
                text: post_text,
                media,
            })
            .await?;
        if !inserted {
            debug!(post_id = %post_id, "Post already persisted, skipping side effects");
            return Ok(());
        }

        if !tags.is_empty() {
            self.store.upsert_trends(&tags).await?;
        }

        match self.invalidator.invalidate_feeds_for_author(user_id).await {
            Ok(deleted) => {
                info!(post_id = %post_id, user_id = %user_id, deleted, "Post created, feeds invalidated")
            }
            Err(e) => warn!(post_id = %post_id, error = %e, "Feed invalidation failed"),
        }

        // Re-warm the author's own first page; follower pages refill lazily
        if let Err(e) = self.feed.warm_first_page(user_id, self.feed_page_size).await {
            warn!(user_id = %user_id, error = %e, "Feed warm failed");
        }

        Ok(())
    }

    async fn update(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        post_text: String,
    ) -> Result<(), JobError> {
        self.store
            .update_post_text(post_id, user_id, post_text)
            .await?;
        if let Err(e) = self.invalidator.invalidate_post(post_id).await {
            warn!(post_id = %post_id, error = %e, "Post invalidation failed");
        }
        Ok(())
    }

    async fn delete(&self, post_id: Uuid, user_id: Uuid) -> Result<(), JobError> {
        self.store.delete_post(post_id, user_id).await?;

        if let Err(e) = self.invalidator.invalidate_post(post_id).await {
            warn!(post_id = %post_id, error = %e, "Post invalidation failed");
        }
        match self.invalidator.invalidate_feeds_for_author(user_id).await {
            Ok(deleted) => {
                info!(post_id = %post_id, user_id = %user_id, deleted, "Post deleted, feeds invalidated")
            }
            Err(e) => warn!(post_id = %post_id, error = %e, "Feed invalidation failed"),
        }
        Ok(())
    }
}

#[async_trait]
impl<C: CacheOps + 'static> JobHandler for PostWorker<C> {
    fn queue(&self) -> &'static str {
        queues::POSTS
    }

    async fn handle(&self, job: &JobEnvelope) -> Result<(), JobError> {
        match job.decode::<PostJob>().map_err(JobError::permanent)? {
            PostJob::Create {
                post_id,
                user_id,
                post_text,
                media,
            } => self.create(post_id, user_id, post_text, media).await,
            PostJob::Update {
                post_id,
                user_id,
                post_text,
            } => self.update(post_id, user_id, post_text).await,
            PostJob::Delete { post_id, user_id } => self.delete(post_id, user_id).await,
        }
    }
}

/// Lowercased `#tags` from post text: alphanumerics and underscores,
/// deduplicated in order of first appearance.
pub fn extract_hashtags(text: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for word in text.split_whitespace() {
        let Some(raw) = word.strip_prefix('#') else {
            continue;
        };
        let tag: String = raw
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect::<String>()
            .to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_and_dedupes_hashtags() {
        assert_eq!(
            extract_hashtags("shipping #Rust today, #rust #async_await!"),
            vec!["rust", "async_await"]
        );
        assert_eq!(extract_hashtags("no tags here"), Vec::<String>::new());
        assert_eq!(extract_hashtags("# #!"), Vec::<String>::new());
    }
}
