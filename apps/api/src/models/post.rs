use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::hot::scorer::EngagementSnapshot;

/// A published post joined with its author and category, as read from Postgres.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PostRow {
    pub post_id: i64,
    pub user_id: i64,
    pub title: String,
    pub category_name: Option<String>,
    pub username: Option<String>,
    /// Raw avatar file name; resolved to a full URL when cached.
    pub avatar: Option<String>,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub share_count: i64,
    pub created_at: DateTime<Utc>,
}

impl PostRow {
    pub fn engagement(&self) -> EngagementSnapshot {
        EngagementSnapshot {
            post_id: self.post_id,
            view_count: self.view_count,
            like_count: self.like_count,
            comment_count: self.comment_count,
            share_count: self.share_count,
            created_at: self.created_at,
        }
    }
}
