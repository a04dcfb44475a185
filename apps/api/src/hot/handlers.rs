//! Axum route handlers for the hot-post API.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::hot::detail::RankedPost;
use crate::hot::manager::{Page, MAX_RANK_DEPTH};
use crate::state::AppState;

const MAX_LIMIT: usize = 100;
const MAX_BATCH: usize = 500;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RecomputeRequest {
    pub post_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub requested: usize,
    pub queued: usize,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

fn bounded(name: &str, value: Option<usize>, default: usize) -> Result<usize, AppError> {
    let value = value.unwrap_or(default);
    if value == 0 || value > MAX_LIMIT {
        return Err(AppError::Validation(format!(
            "{name} must be between 1 and {MAX_LIMIT}"
        )));
    }
    Ok(value)
}

/// GET /api/v1/posts/hot
pub async fn handle_hot_posts(
    State(state): State<AppState>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Vec<RankedPost>>, AppError> {
    let limit = bounded("limit", params.limit, 10)?;
    Ok(Json(state.hot_posts.top_posts(limit).await))
}

/// GET /api/v1/posts/hot/page
pub async fn handle_hot_page(
    State(state): State<AppState>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Page<RankedPost>>, AppError> {
    let page = params.page.unwrap_or(1);
    if page == 0 {
        return Err(AppError::Validation("page starts at 1".to_string()));
    }
    let page_size = bounded("page_size", params.page_size, 10)?;
    if page
        .checked_mul(page_size)
        .map_or(true, |depth| depth > MAX_RANK_DEPTH)
    {
        return Err(AppError::Validation(format!(
            "only the top {MAX_RANK_DEPTH} hot posts can be paged"
        )));
    }
    Ok(Json(state.hot_posts.hot_page(page, page_size).await))
}

/// GET /api/v1/posts/hot/burst
pub async fn handle_burst_posts(
    State(state): State<AppState>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Vec<RankedPost>>, AppError> {
    let limit = bounded("limit", params.limit, 5)?;
    Ok(Json(state.hot_posts.burst_posts(limit).await))
}

/// POST /api/v1/posts/:id/engagement
///
/// Called by the CRUD layer whenever view/like/comment/share counts change.
/// Always 202: a lost signal only delays ranking freshness.
pub async fn handle_engagement_changed(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> StatusCode {
    state.dispatcher.enqueue(post_id).await;
    StatusCode::ACCEPTED
}

/// POST /api/v1/posts/hot/recompute
pub async fn handle_batch_recompute(
    State(state): State<AppState>,
    Json(req): Json<RecomputeRequest>,
) -> Result<(StatusCode, Json<QueuedResponse>), AppError> {
    if req.post_ids.is_empty() {
        return Err(AppError::Validation("post_ids cannot be empty".to_string()));
    }
    if req.post_ids.len() > MAX_BATCH {
        return Err(AppError::Validation(format!(
            "at most {MAX_BATCH} post_ids per request"
        )));
    }
    let queued = state.dispatcher.enqueue_batch(&req.post_ids).await;
    Ok((
        StatusCode::ACCEPTED,
        Json(QueuedResponse {
            requested: req.post_ids.len(),
            queued,
        }),
    ))
}
