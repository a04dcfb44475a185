pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::hot::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Hot-post ranking
        .route("/api/v1/posts/hot", get(handlers::handle_hot_posts))
        .route("/api/v1/posts/hot/page", get(handlers::handle_hot_page))
        .route("/api/v1/posts/hot/burst", get(handlers::handle_burst_posts))
        .route(
            "/api/v1/posts/hot/recompute",
            post(handlers::handle_batch_recompute),
        )
        .route(
            "/api/v1/posts/:id/engagement",
            post(handlers::handle_engagement_changed),
        )
        .with_state(state)
}
