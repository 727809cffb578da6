use anyhow::Context;
use pipeline_service::cache::{ChatCacheManager, FeedCacheManager};
use pipeline_service::config::Config;
use pipeline_service::invalidation::CacheInvalidator;
use pipeline_service::store::{ChatStore, PgStore, SocialStore};
use pipeline_service::workers::{CommentWorker, LikeWorker, MessageWorker, PostWorker, SeenWorker};
use pulse_cache::{CacheMetrics, RedisCacheStore};
use pulse_events::RedisBroadcaster;
use pulse_queue::{JobHandler, QueueMetrics, QueueWorker, WorkerConfig};
use redis_utils::RedisPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let registry = prometheus::default_registry();
    CacheMetrics::register(registry).context("registering cache metrics")?;
    QueueMetrics::register(registry).context("registering queue metrics")?;

    let config = Config::from_env().context("loading configuration")?;

    let redis = RedisPool::connect(&config.redis_url)
        .await
        .context("connecting to Redis")?;
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("connecting to Postgres")?;

    let pg = Arc::new(PgStore::new(pool));
    let store: Arc<dyn SocialStore> = pg.clone();
    let chat_store: Arc<dyn ChatStore> = pg;

    let cache = Arc::new(RedisCacheStore::new(redis.manager()));
    let broadcaster = Arc::new(RedisBroadcaster::new(redis.manager()));

    let invalidator = CacheInvalidator::new(Arc::clone(&cache), Arc::clone(&store));
    let feed = FeedCacheManager::new(Arc::clone(&cache), Arc::clone(&store));
    let chat_cache = ChatCacheManager::new(Arc::clone(&cache));

    let handlers: Vec<Arc<dyn JobHandler>> = vec![
        Arc::new(PostWorker::new(
            Arc::clone(&store),
            invalidator.clone(),
            feed.clone(),
            config.feed_page_size,
        )),
        Arc::new(CommentWorker::new(
            Arc::clone(&store),
            invalidator.clone(),
            broadcaster.clone(),
        )),
        Arc::new(LikeWorker::new(
            Arc::clone(&store),
            Arc::clone(&chat_store),
            invalidator.clone(),
            chat_cache.clone(),
            broadcaster.clone(),
        )),
        Arc::new(SeenWorker::new(
            Arc::clone(&chat_store),
            chat_cache.clone(),
            broadcaster.clone(),
        )),
        Arc::new(MessageWorker::new(
            Arc::clone(&chat_store),
            chat_cache.clone(),
        )),
    ];

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let mut tasks = Vec::with_capacity(handlers.len());
    for handler in handlers {
        // Each worker blocks on XREADGROUP, so each gets its own connection
        let conn = redis
            .dedicated_connection()
            .await
            .context("opening worker connection")?;
        let worker = QueueWorker::new(
            conn,
            handler,
            WorkerConfig::with_concurrency(config.worker_concurrency),
        );
        tasks.push(tokio::spawn(worker.run(shutdown_rx.clone())));
    }

    let health = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            interval.tick().await;
            if let Err(e) = redis.ping().await {
                tracing::warn!(error = %e, "Redis health check failed");
            }
        }
    });

    info!(workers = tasks.len(), "Pipeline service started");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
    health.abort();

    for task in tasks {
        let _ = task.await;
    }
    info!("Pipeline service stopped");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pipeline_service=debug"));

    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
