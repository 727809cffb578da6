use crate::cache::FeedCacheManager;
use crate::error::{AppError, AppResult};
use crate::invalidation::CacheInvalidator;
use crate::jobs::{CommentJob, LikeJob, PostJob};
use crate::models::{FeedPage, TargetType};
use crate::store::SocialStore;
use pulse_cache::CacheOps;
use pulse_queue::{enqueue, EnqueueOptions, JobDispatch};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub const MAX_POST_TEXT: usize = 5_000;
pub const MAX_COMMENT_TEXT: usize = 1_000;

pub struct PostService<C> {
    store: Arc<dyn SocialStore>,
    dispatch: Arc<dyn JobDispatch>,
    invalidator: CacheInvalidator<C>,
    feed: FeedCacheManager<C>,
}

impl<C: CacheOps> PostService<C> {
    pub fn new(
        store: Arc<dyn SocialStore>,
        dispatch: Arc<dyn JobDispatch>,
        invalidator: CacheInvalidator<C>,
        feed: FeedCacheManager<C>,
    ) -> Self {
        Self {
            store,
            dispatch,
            invalidator,
            feed,
        }
    }

    pub async fn get_feed(
        &self,
        viewer_id: Uuid,
        cursor: Option<Uuid>,
        page_size: u32,
    ) -> AppResult<FeedPage> {
        self.feed.get_feed(viewer_id, cursor, page_size).await
    }

    pub async fn get_own_posts(
        &self,
        user_id: Uuid,
        cursor: Option<Uuid>,
        take: u32,
    ) -> AppResult<FeedPage> {
        self.feed.get_own_posts(user_id, cursor, take).await
    }

    /// Validate and enqueue a post creation. Returns the ID the post
    /// will have once the worker lands it.
    pub async fn create_post(
        &self,
        user_id: Uuid,
        text: String,
        media: Vec<String>,
    ) -> AppResult<Uuid> {
        let text = text.trim().to_string();
        if text.is_empty() && media.is_empty() {
            return Err(AppError::BadRequest("post cannot be empty".into()));
        }
        if text.len() > MAX_POST_TEXT {
            return Err(AppError::BadRequest("post text too long".into()));
        }

        let post_id = Uuid::new_v4();
        enqueue(
            self.dispatch.as_ref(),
            &PostJob::Create {
                post_id,
                user_id,
                post_text: text,
                media,
            },
            EnqueueOptions::default(),
        )
        .await?;

        info!(post_id = %post_id, user_id = %user_id, "Post creation enqueued");
        Ok(post_id)
    }

    pub async fn update_post(&self, post_id: Uuid, user_id: Uuid, text: String) -> AppResult<()> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(AppError::BadRequest("post cannot be empty".into()));
        }
        if text.len() > MAX_POST_TEXT {
            return Err(AppError::BadRequest("post text too long".into()));
        }
        self.check_post_ownership(post_id, user_id).await?;

        enqueue(
            self.dispatch.as_ref(),
            &PostJob::Update {
                post_id,
                user_id,
                post_text: text,
            },
            EnqueueOptions::default(),
        )
        .await?;
        Ok(())
    }

    pub async fn delete_post(&self, post_id: Uuid, user_id: Uuid) -> AppResult<()> {
        self.check_post_ownership(post_id, user_id).await?;

        enqueue(
            self.dispatch.as_ref(),
            &PostJob::Delete { post_id, user_id },
            EnqueueOptions::default(),
        )
        .await?;
        Ok(())
    }

    /// Validate, synchronously drop the post's cache entry, then
    /// enqueue. The eager drop keeps the visible comment count from
    /// lagging a whole TTL behind the write.
    pub async fn add_comment(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        text: String,
        parent_id: Option<Uuid>,
    ) -> AppResult<Uuid> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(AppError::BadRequest("comment cannot be empty".into()));
        }
        if text.len() > MAX_COMMENT_TEXT {
            return Err(AppError::BadRequest("comment text too long".into()));
        }
        if self.store.post_by_id(post_id).await?.is_none() {
            return Err(AppError::NotFound);
        }
        if let Some(parent_id) = parent_id {
            match self.store.comment_by_id(parent_id).await? {
                Some(parent) if parent.post_id == post_id => {}
                Some(_) => {
                    return Err(AppError::BadRequest(
                        "parent comment belongs to another post".into(),
                    ))
                }
                None => return Err(AppError::NotFound),
            }
        }

        if let Err(e) = self.invalidator.invalidate_post(post_id).await {
            warn!(post_id = %post_id, error = %e, "Pre-enqueue post invalidation failed");
        }

        let comment_id = Uuid::new_v4();
        enqueue(
            self.dispatch.as_ref(),
            &CommentJob::Create {
                comment_id,
                post_id,
                user_id,
                text,
                parent_id,
            },
            EnqueueOptions::default(),
        )
        .await?;
        Ok(comment_id)
    }

    pub async fn delete_comment(&self, comment_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let comment = self
            .store
            .comment_by_id(comment_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if comment.author_id != user_id {
            return Err(AppError::Forbidden);
        }

        enqueue(
            self.dispatch.as_ref(),
            &CommentJob::Delete {
                comment_id,
                user_id,
            },
            EnqueueOptions::default(),
        )
        .await?;
        Ok(())
    }

    pub async fn like_post(&self, post_id: Uuid, user_id: Uuid) -> AppResult<()> {
        if self.store.post_by_id(post_id).await?.is_none() {
            return Err(AppError::NotFound);
        }
        self.enqueue_like(post_id, TargetType::Post, user_id, true)
            .await
    }

    pub async fn unlike_post(&self, post_id: Uuid, user_id: Uuid) -> AppResult<()> {
        self.enqueue_like(post_id, TargetType::Post, user_id, false)
            .await
    }

    pub async fn like_comment(&self, comment_id: Uuid, user_id: Uuid) -> AppResult<()> {
        if self.store.comment_by_id(comment_id).await?.is_none() {
            return Err(AppError::NotFound);
        }
        self.enqueue_like(comment_id, TargetType::Comment, user_id, true)
            .await
    }

    pub async fn unlike_comment(&self, comment_id: Uuid, user_id: Uuid) -> AppResult<()> {
        self.enqueue_like(comment_id, TargetType::Comment, user_id, false)
            .await
    }

    async fn enqueue_like(
        &self,
        target_id: Uuid,
        target_type: TargetType,
        user_id: Uuid,
        like: bool,
    ) -> AppResult<()> {
        let job = if like {
            LikeJob::Like {
                target_id,
                target_type,
                user_id,
                chat_id: None,
            }
        } else {
            LikeJob::Unlike {
                target_id,
                target_type,
                user_id,
                chat_id: None,
            }
        };
        enqueue(self.dispatch.as_ref(), &job, EnqueueOptions::default()).await?;
        Ok(())
    }

    async fn check_post_ownership(&self, post_id: Uuid, user_id: Uuid) -> AppResult<()> {
        let post = self
            .store
            .post_by_id(post_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if post.author.id != user_id {
            return Err(AppError::Forbidden);
        }
        Ok(())
    }
}
