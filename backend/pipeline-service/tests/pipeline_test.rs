//! End-to-end pipeline tests over the in-memory store, cache, queue and
//! broadcaster. Jobs are executed by handing drained envelopes straight
//! to the worker handlers, which is exactly what the queue worker does
//! after a stream read.

use pipeline_service::cache::{ChatCacheManager, FeedCacheManager, FollowListCacheManager};
use pipeline_service::invalidation::CacheInvalidator;
use pipeline_service::jobs::queues;
use pipeline_service::services::{FollowService, MessageService, PostService};
use pipeline_service::store::{ChatStore, MemoryStore, SocialStore};
use pipeline_service::workers::{
    CommentWorker, LikeWorker, MessageWorker, PostWorker, SeenWorker,
};
use pulse_cache::{CacheKey, CacheOps, MemoryCacheStore};
use pulse_events::{chat_channel, event, notification_channel, user_channel, RecordingBroadcaster};
use pulse_queue::{JobDispatch, JobEnvelope, JobHandler, MemoryJobQueue};
use std::sync::Arc;
use uuid::Uuid;

const PAGE_SIZE: u32 = 5;

struct Harness {
    store: Arc<MemoryStore>,
    cache: Arc<MemoryCacheStore>,
    queue: MemoryJobQueue,
    broadcaster: Arc<RecordingBroadcaster>,
    posts: PostService<MemoryCacheStore>,
    follows: FollowService<MemoryCacheStore>,
    messages: MessageService<MemoryCacheStore>,
    post_worker: PostWorker<MemoryCacheStore>,
    comment_worker: CommentWorker<MemoryCacheStore>,
    like_worker: LikeWorker<MemoryCacheStore>,
    seen_worker: SeenWorker<MemoryCacheStore>,
    message_worker: MessageWorker<MemoryCacheStore>,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCacheStore::new());
        let queue = MemoryJobQueue::new();
        let broadcaster = Arc::new(RecordingBroadcaster::new());

        let social: Arc<dyn SocialStore> = store.clone();
        let chat: Arc<dyn ChatStore> = store.clone();
        let dispatch: Arc<dyn JobDispatch> = Arc::new(queue.clone());

        let invalidator = CacheInvalidator::new(cache.clone(), social.clone());
        let feed = FeedCacheManager::new(cache.clone(), social.clone());
        let follow_cache = FollowListCacheManager::new(cache.clone(), social.clone(), 20);
        let chat_cache = ChatCacheManager::new(cache.clone());

        let posts = PostService::new(
            social.clone(),
            dispatch.clone(),
            invalidator.clone(),
            feed.clone(),
        );
        let follows = FollowService::new(social.clone(), follow_cache, invalidator.clone());
        let messages = MessageService::new(
            chat.clone(),
            chat_cache.clone(),
            dispatch,
            broadcaster.clone(),
            30,
            3,
            2000,
        );

        let post_worker = PostWorker::new(
            social.clone(),
            invalidator.clone(),
            feed,
            PAGE_SIZE,
        );
        let comment_worker =
            CommentWorker::new(social.clone(), invalidator.clone(), broadcaster.clone());
        let like_worker = LikeWorker::new(
            social.clone(),
            chat.clone(),
            invalidator,
            chat_cache.clone(),
            broadcaster.clone(),
        );
        let seen_worker = SeenWorker::new(chat.clone(), chat_cache.clone(), broadcaster.clone());
        let message_worker = MessageWorker::new(chat, chat_cache);

        Self {
            store,
            cache,
            queue,
            broadcaster,
            posts,
            follows,
            messages,
            post_worker,
            comment_worker,
            like_worker,
            seen_worker,
            message_worker,
        }
    }

    async fn handle(&self, envelope: &JobEnvelope) -> Result<(), pulse_queue::JobError> {
        match envelope.queue.as_str() {
            queues::POSTS => self.post_worker.handle(envelope).await,
            queues::COMMENTS => self.comment_worker.handle(envelope).await,
            queues::LIKES => self.like_worker.handle(envelope).await,
            queues::SEEN => self.seen_worker.handle(envelope).await,
            queues::MESSAGES => self.message_worker.handle(envelope).await,
            other => panic!("unexpected queue {other}"),
        }
    }

    /// Drain and execute every enqueued job until quiescent.
    async fn run_jobs(&self) {
        loop {
            let envelopes = self.queue.drain().await;
            if envelopes.is_empty() {
                break;
            }
            for envelope in envelopes {
                if let Err(e) = self.handle(&envelope).await {
                    panic!("job on {} failed: {e}", envelope.queue);
                }
            }
        }
    }

    /// Author with `count` posts at strictly decreasing ages, oldest
    /// first in the returned vec.
    fn seed_posts(&self, author: Uuid, count: u32) -> Vec<Uuid> {
        let base = chrono::Utc::now();
        (0..count)
            .map(|i| {
                self.store.add_post_at(
                    author,
                    &format!("post {i}"),
                    base - chrono::Duration::seconds((count - i) as i64),
                )
            })
            .collect()
    }
}

#[tokio::test]
async fn feed_boundary_exactly_page_size_has_no_more() {
    let h = Harness::new();
    let author = h.store.add_user("ada");
    let viewer = h.store.add_user("vera");
    h.store.insert_follow(viewer, author).await.unwrap();
    h.seed_posts(author, PAGE_SIZE);

    let page = h.posts.get_feed(viewer, None, PAGE_SIZE).await.unwrap();
    assert_eq!(page.posts.len(), PAGE_SIZE as usize);
    assert!(!page.has_more);
}

#[tokio::test]
async fn feed_boundary_overflow_sets_cursor_to_last_returned_post() {
    let h = Harness::new();
    let author = h.store.add_user("ada");
    let viewer = h.store.add_user("vera");
    h.store.insert_follow(viewer, author).await.unwrap();
    h.seed_posts(author, PAGE_SIZE + 1);

    let first = h.posts.get_feed(viewer, None, PAGE_SIZE).await.unwrap();
    assert_eq!(first.posts.len(), PAGE_SIZE as usize);
    assert!(first.has_more);
    assert_eq!(first.cursor, Some(first.posts.last().unwrap().id));

    let second = h
        .posts
        .get_feed(viewer, first.cursor, PAGE_SIZE)
        .await
        .unwrap();
    assert_eq!(second.posts.len(), 1);
    assert!(!second.has_more);
}

#[tokio::test]
async fn feed_pages_keep_posts_that_share_a_timestamp() {
    let h = Harness::new();
    let author = h.store.add_user("ada");
    let viewer = h.store.add_user("vera");
    h.store.insert_follow(viewer, author).await.unwrap();

    // Two posts tie on created_at right at the page boundary
    let base = chrono::Utc::now();
    let newest = h.store.add_post_at(author, "solo", base);
    let tied_at = base - chrono::Duration::seconds(10);
    let tied = [
        h.store.add_post_at(author, "tied a", tied_at),
        h.store.add_post_at(author, "tied b", tied_at),
    ];

    let first = h.posts.get_feed(viewer, None, 2).await.unwrap();
    assert_eq!(first.posts.len(), 2);
    assert_eq!(first.posts[0].id, newest);
    assert!(first.has_more);

    let second = h.posts.get_feed(viewer, first.cursor, 2).await.unwrap();
    assert_eq!(second.posts.len(), 1, "tied post lost at the boundary");
    assert!(!second.has_more);

    let mut seen: Vec<Uuid> = first
        .posts
        .iter()
        .chain(second.posts.iter())
        .map(|p| p.id)
        .collect();
    seen.sort();
    let mut all = vec![newest, tied[0], tied[1]];
    all.sort();
    assert_eq!(seen, all);
}

#[tokio::test]
async fn cold_feed_merges_followed_authors_and_self() {
    let h = Harness::new();
    let u = h.store.add_user("u");
    let a = h.store.add_user("a");
    let b = h.store.add_user("b");
    h.store.insert_follow(u, a).await.unwrap();
    h.store.insert_follow(u, b).await.unwrap();
    h.seed_posts(a, 3);
    h.seed_posts(b, 2);
    h.seed_posts(u, 1);

    // 6 posts available at page size 5: the overflow row proves more
    let page = h.posts.get_feed(u, None, PAGE_SIZE).await.unwrap();
    assert_eq!(page.posts.len(), PAGE_SIZE as usize);
    assert!(page.has_more);

    let rest = h.posts.get_feed(u, page.cursor, PAGE_SIZE).await.unwrap();
    assert_eq!(rest.posts.len(), 1);
    assert!(!rest.has_more);

    // Newest-first across all three authors
    let timestamps: Vec<_> = page.posts.iter().map(|p| p.created_at).collect();
    let mut sorted = timestamps.clone();
    sorted.sort_by(|x, y| y.cmp(x));
    assert_eq!(timestamps, sorted);
}

#[tokio::test]
async fn cached_feed_reconstruction_preserves_order() {
    let h = Harness::new();
    let author = h.store.add_user("ada");
    let viewer = h.store.add_user("vera");
    h.store.insert_follow(viewer, author).await.unwrap();
    h.seed_posts(author, 3);

    // Warm the first page, then expire the middle post's entry
    let warm = h.posts.get_feed(viewer, None, PAGE_SIZE).await.unwrap();
    let order: Vec<Uuid> = warm.posts.iter().map(|p| p.id).collect();
    let middle = order[1];
    h.cache.del(&CacheKey::post(middle)).await.unwrap();

    let reread = h.posts.get_feed(viewer, None, PAGE_SIZE).await.unwrap();
    let reread_order: Vec<Uuid> = reread.posts.iter().map(|p| p.id).collect();
    assert_eq!(reread_order, order, "spliced post must keep its slot");

    // A post deleted from the store drops out without disturbing order
    h.store.delete_post(middle, author).await.unwrap();
    h.cache.del(&CacheKey::post(middle)).await.unwrap();

    let after_delete = h.posts.get_feed(viewer, None, PAGE_SIZE).await.unwrap();
    let remaining: Vec<Uuid> = after_delete.posts.iter().map(|p| p.id).collect();
    assert_eq!(remaining, vec![order[0], order[2]]);
}

#[tokio::test]
async fn post_creation_invalidates_every_follower_feed() {
    let h = Harness::new();
    let author = h.store.add_user("ada");
    let f1 = h.store.add_user("f1");
    let f2 = h.store.add_user("f2");
    h.store.insert_follow(f1, author).await.unwrap();
    h.store.insert_follow(f2, author).await.unwrap();
    h.seed_posts(author, 2);

    // Warm all follower feeds
    h.posts.get_feed(f1, None, PAGE_SIZE).await.unwrap();
    h.posts.get_feed(f2, None, PAGE_SIZE).await.unwrap();
    assert!(h.cache.exists(&CacheKey::feed_first(f1, PAGE_SIZE)).await.unwrap());

    let post_id = h
        .posts
        .create_post(author, "fresh #news".into(), vec![])
        .await
        .unwrap();
    h.run_jobs().await;

    // Both followers see the new post on their next first-page read
    for follower in [f1, f2] {
        let page = h.posts.get_feed(follower, None, PAGE_SIZE).await.unwrap();
        assert_eq!(page.posts[0].id, post_id, "stale feed for follower");
    }

    // The author's own first page came back warm, and the hashtag landed
    assert!(h
        .cache
        .exists(&CacheKey::feed_first(author, PAGE_SIZE))
        .await
        .unwrap());
    assert_eq!(h.store.trend_uses("news"), 1);
}

#[tokio::test]
async fn redelivered_post_creation_is_single_shot() {
    let h = Harness::new();
    let author = h.store.add_user("ada");

    h.posts
        .create_post(author, "once #tag".into(), vec![])
        .await
        .unwrap();
    let envelopes = h.queue.drain().await;
    assert_eq!(envelopes.len(), 1);

    h.handle(&envelopes[0]).await.unwrap();
    h.handle(&envelopes[0]).await.unwrap();

    let own = h.posts.get_own_posts(author, None, 10).await.unwrap();
    assert_eq!(own.posts.len(), 1);
    // Trend side effect ran once, not once per delivery
    assert_eq!(h.store.trend_uses("tag"), 1);
}

#[tokio::test]
async fn like_then_unlike_restores_prior_state() {
    let h = Harness::new();
    let author = h.store.add_user("ada");
    let fan = h.store.add_user("fan");
    let post_id = h.seed_posts(author, 1)[0];

    h.posts.like_post(post_id, fan).await.unwrap();
    h.run_jobs().await;

    let liked = h.store.post_by_id(post_id).await.unwrap().unwrap();
    assert_eq!(liked.like_count, 1);
    assert_eq!(h.store.notification_count(), 1);
    let notis = h
        .broadcaster
        .on_channel(&notification_channel(author))
        .await;
    assert_eq!(notis.len(), 1);
    assert_eq!(notis[0].event, event::NEW_NOTIFICATION);

    h.posts.unlike_post(post_id, fan).await.unwrap();
    h.run_jobs().await;

    let unliked = h.store.post_by_id(post_id).await.unwrap().unwrap();
    assert_eq!(unliked.like_count, 0);
    assert_eq!(h.store.notification_count(), 0);
    let retractions = h
        .broadcaster
        .on_channel(&notification_channel(author))
        .await;
    assert_eq!(retractions.len(), 2);
    assert_eq!(retractions[1].payload["deleted"], true);
}

#[tokio::test]
async fn self_like_produces_no_notification() {
    let h = Harness::new();
    let author = h.store.add_user("ada");
    let post_id = h.seed_posts(author, 1)[0];

    h.posts.like_post(post_id, author).await.unwrap();
    h.run_jobs().await;

    assert_eq!(
        h.store.post_by_id(post_id).await.unwrap().unwrap().like_count,
        1
    );
    assert_eq!(h.store.notification_count(), 0);
}

#[tokio::test]
async fn comment_notifies_post_author_and_reply_parent() {
    let h = Harness::new();
    let author = h.store.add_user("ada");
    let commenter = h.store.add_user("carl");
    let replier = h.store.add_user("rita");
    let post_id = h.seed_posts(author, 1)[0];

    let comment_id = h
        .posts
        .add_comment(post_id, commenter, "nice".into(), None)
        .await
        .unwrap();
    h.run_jobs().await;
    assert_eq!(h.store.notification_count(), 1);

    let reply_id = h
        .posts
        .add_comment(post_id, replier, "agreed".into(), Some(comment_id))
        .await
        .unwrap();
    h.run_jobs().await;

    let reply = h.store.comment_by_id(reply_id).await.unwrap().unwrap();
    assert_eq!(reply.parent_id, Some(comment_id));

    // One for the first comment, then comment + reply notifications
    assert_eq!(h.store.notification_count(), 3);
    assert_eq!(
        h.broadcaster
            .on_channel(&notification_channel(commenter))
            .await
            .len(),
        1
    );

    let post = h.store.post_by_id(post_id).await.unwrap().unwrap();
    assert_eq!(post.comment_count, 2);
    assert_eq!(post.first_comment.unwrap().id, comment_id);
}

#[tokio::test]
async fn send_message_broadcasts_caches_and_persists() {
    let h = Harness::new();
    let alice = h.store.add_user("alice");
    let bob = h.store.add_user("bob");
    let chat = h.store.add_chat(vec![alice, bob]);

    let message = h
        .messages
        .send_message(chat, alice, "hello".into(), None, None)
        .await
        .unwrap();

    // Broadcast and ephemeral snapshot are visible before persistence
    let chat_events = h.broadcaster.on_channel(&chat_channel(chat)).await;
    assert_eq!(chat_events.len(), 1);
    assert_eq!(chat_events[0].event, event::NEW_MESSAGE);
    assert!(h
        .cache
        .exists(&CacheKey::message(message.id))
        .await
        .unwrap());

    h.run_jobs().await;

    // Persisted exactly once, ephemeral snapshot cleaned up
    let page = h.messages.messages(chat, bob).await.unwrap();
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.messages[0].id, message.id);
    assert!(!h
        .cache
        .exists(&CacheKey::message(message.id))
        .await
        .unwrap());
    assert_eq!(h.messages.unread_count(chat, bob).await.unwrap(), 1);
    assert_eq!(h.messages.unread_count(chat, alice).await.unwrap(), 0);
}

#[tokio::test]
async fn duplicate_persist_message_job_is_tolerated() {
    let h = Harness::new();
    let alice = h.store.add_user("alice");
    let bob = h.store.add_user("bob");
    let chat = h.store.add_chat(vec![alice, bob]);

    h.messages
        .send_message(chat, alice, "once".into(), None, None)
        .await
        .unwrap();
    let envelopes = h.queue.drain().await;
    assert_eq!(envelopes.len(), 1);
    assert_eq!(envelopes[0].max_attempts, 3);

    // Simulated at-least-once redelivery: second attempt must succeed
    h.handle(&envelopes[0]).await.unwrap();
    h.handle(&envelopes[0]).await.unwrap();

    let page = h.messages.messages(chat, bob).await.unwrap();
    assert_eq!(page.messages.len(), 1);
}

#[tokio::test]
async fn seen_marking_is_idempotent_and_notifies_sender() {
    let h = Harness::new();
    let alice = h.store.add_user("alice");
    let bob = h.store.add_user("bob");
    let chat = h.store.add_chat(vec![alice, bob]);

    let message = h
        .messages
        .send_message(chat, alice, "look".into(), None, None)
        .await
        .unwrap();
    h.run_jobs().await;

    h.messages.mark_seen(chat, message.id, bob).await.unwrap();
    h.messages.mark_seen(chat, message.id, bob).await.unwrap();
    h.run_jobs().await;

    assert_eq!(h.messages.unread_count(chat, bob).await.unwrap(), 0);
    let stored = h.store.message_by_id(message.id).await.unwrap().unwrap();
    assert!(stored.seen);

    // Read receipt reached the sender's background channel
    let receipts = h.broadcaster.on_channel(&user_channel(alice)).await;
    assert!(receipts
        .iter()
        .any(|b| b.event == event::MESSAGE_SEEN && b.payload["seenBy"] == bob.to_string()));

    // Marking your own message is a silent no-op
    h.messages.mark_seen(chat, message.id, alice).await.unwrap();
    assert!(h.queue.drain().await.is_empty());
}

#[tokio::test]
async fn message_like_updates_cache_and_fans_out() {
    let h = Harness::new();
    let alice = h.store.add_user("alice");
    let bob = h.store.add_user("bob");
    let chat = h.store.add_chat(vec![alice, bob]);

    let message = h
        .messages
        .send_message(chat, alice, "likable".into(), None, None)
        .await
        .unwrap();
    h.run_jobs().await;
    // Populate the cached page so the patch has something to hit
    h.messages.messages(chat, bob).await.unwrap();

    h.messages.like_message(message.id, bob).await.unwrap();
    h.run_jobs().await;

    let page = h.messages.messages(chat, bob).await.unwrap();
    assert_eq!(page.messages[0].likes, vec![bob]);

    let chat_events = h.broadcaster.on_channel(&chat_channel(chat)).await;
    assert!(chat_events
        .iter()
        .any(|b| b.event == event::MESSAGE_LIKE_UPDATED));
    let alice_events = h.broadcaster.on_channel(&user_channel(alice)).await;
    assert!(alice_events
        .iter()
        .any(|b| b.event == event::MESSAGE_LIKE_UPDATED));
    // No notification rows for message likes
    assert_eq!(h.store.notification_count(), 0);

    h.messages.unlike_message(message.id, bob).await.unwrap();
    h.run_jobs().await;
    let page = h.messages.messages(chat, bob).await.unwrap();
    assert!(page.messages[0].likes.is_empty());
}

#[tokio::test]
async fn non_participants_are_rejected() {
    let h = Harness::new();
    let alice = h.store.add_user("alice");
    let bob = h.store.add_user("bob");
    let eve = h.store.add_user("eve");
    let chat = h.store.add_chat(vec![alice, bob]);

    let err = h
        .messages
        .send_message(chat, eve, "hi".into(), None, None)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 403);

    let err = h.messages.messages(chat, eve).await.unwrap_err();
    assert_eq!(err.status_code(), 403);

    let missing = h
        .messages
        .messages(Uuid::new_v4(), alice)
        .await
        .unwrap_err();
    assert_eq!(missing.status_code(), 404);
}

#[tokio::test]
async fn follow_refreshes_lists_and_feed() {
    let h = Harness::new();
    let ada = h.store.add_user("ada");
    let vera = h.store.add_user("vera");
    h.seed_posts(ada, 1);

    // Warm vera's (empty-follow) feed, then follow
    h.posts.get_feed(vera, None, PAGE_SIZE).await.unwrap();
    h.follows.follow(vera, ada).await.unwrap();

    // Both users' first follow pages are warm again
    assert!(h
        .cache
        .exists(&CacheKey::followers_first(ada, 20))
        .await
        .unwrap());
    assert!(h
        .cache
        .exists(&CacheKey::following_first(vera, 20))
        .await
        .unwrap());

    // Vera's feed was invalidated and now includes ada's post
    let page = h.posts.get_feed(vera, None, PAGE_SIZE).await.unwrap();
    assert_eq!(page.posts.len(), 1);

    let followers = h.follows.followers(ada, 0, 20).await.unwrap();
    assert_eq!(followers.users.len(), 1);
    assert_eq!(followers.users[0].id, vera);
    assert!(followers.next_cursor.is_none());

    h.follows.unfollow(vera, ada).await.unwrap();
    let followers = h.follows.followers(ada, 0, 20).await.unwrap();
    assert!(followers.users.is_empty());
}

#[tokio::test]
async fn follow_list_deep_pages_bypass_cache() {
    let h = Harness::new();
    let ada = h.store.add_user("ada");
    for i in 0..25 {
        let fan = h.store.add_user(&format!("fan{i}"));
        h.store.insert_follow(fan, ada).await.unwrap();
    }

    let first = h.follows.followers(ada, 0, 20).await.unwrap();
    assert_eq!(first.users.len(), 20);
    assert_eq!(first.next_cursor, Some(20));

    let second = h.follows.followers(ada, 20, 20).await.unwrap();
    assert_eq!(second.users.len(), 5);
    assert!(second.next_cursor.is_none());
    // Only the first page was cached
    assert_eq!(h.cache.keys_matching("followers:*").await.unwrap().len(), 1);
}

#[tokio::test]
async fn empty_post_is_rejected_before_enqueue() {
    let h = Harness::new();
    let ada = h.store.add_user("ada");

    let err = h
        .posts
        .create_post(ada, "   ".into(), vec![])
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert!(h.queue.drain().await.is_empty());

    // Media-only posts are fine
    h.posts
        .create_post(ada, "".into(), vec!["pic.jpg".into()])
        .await
        .unwrap();
    assert_eq!(h.queue.drain().await.len(), 1);
}
