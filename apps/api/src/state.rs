use std::sync::Arc;

use crate::hot::dispatcher::RecomputeDispatcher;
use crate::hot::manager::RankingCacheManager;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Read path of the hot-post ranking.
    pub hot_posts: Arc<RankingCacheManager>,
    /// Publishes recompute jobs after engagement changes.
    pub dispatcher: RecomputeDispatcher,
}
