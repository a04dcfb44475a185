mod config;
mod db;
mod errors;
mod hot;
mod models;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::hot::clock::{Clock, SystemClock};
use crate::hot::dispatcher::RecomputeDispatcher;
use crate::hot::manager::RankingCacheManager;
use crate::hot::queue::{MessageQueue, RedisListQueue};
use crate::hot::repository::{PgPostRepository, PostRepository};
use crate::hot::scorer::HotnessScorer;
use crate::hot::store::RedisRankedStore;
use crate::hot::worker::RecomputeWorker;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting CampusHub API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    let repo: Arc<dyn PostRepository> = Arc::new(PgPostRepository::new(db));

    // Initialize Redis: ranked cache and recompute queue share one client
    let redis = redis::Client::open(config.redis_url.clone())?;
    let store = RedisRankedStore::connect(redis.clone()).await?;
    if let Err(e) = store.ping().await {
        warn!("Redis not reachable at startup, hot ranking will fall back to the database: {e}");
    }
    let queue: Arc<dyn MessageQueue> = Arc::new(RedisListQueue::connect(redis).await?);
    info!("Redis client initialized");

    let scorer = HotnessScorer::default();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let manager = Arc::new(RankingCacheManager::new(
        repo.clone(),
        Arc::new(store),
        scorer.clone(),
        clock.clone(),
        config.ranking_settings(),
    ));
    let dispatcher = RecomputeDispatcher::new(queue.clone(), config.hot_queue_topic.clone())
        .with_publish_timeout(Duration::from_millis(config.hot_publish_timeout_ms));

    // Spawn recompute workers (competing consumers on one topic)
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = Vec::with_capacity(config.hot_worker_count);
    for id in 0..config.hot_worker_count {
        let jobs = queue.subscribe(&config.hot_queue_topic).await?;
        let worker = RecomputeWorker::new(
            id,
            repo.clone(),
            manager.clone(),
            scorer.clone(),
            clock.clone(),
        );
        workers.push(tokio::spawn(worker.run(jobs, shutdown_rx.clone())));
    }
    info!(
        "Started {} hotness recompute worker(s) on '{}'",
        config.hot_worker_count, config.hot_queue_topic
    );

    // Build app state
    let state = AppState {
        hot_posts: manager,
        dispatcher,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins to the campus frontend domain

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {e}");
            }
            info!("Shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    for handle in workers {
        if let Err(e) = handle.await {
            warn!("Recompute worker ended abnormally: {e}");
        }
    }

    Ok(())
}
