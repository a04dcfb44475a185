//! Cached post projection stored next to each rank entry.
//!
//! The payload is JSON internally tagged by `"version"`. Both the rebuild path and the
//! recompute worker write through [`encode`]; [`decode`] treats anything it does not
//! recognise (unknown version, missing field, not JSON) as a miss.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hot::scorer::HotnessScore;
use crate::models::post::PostRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedDetail {
    pub post_id: i64,
    pub user_id: i64,
    pub title: String,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub author_display_name: Option<String>,
    #[serde(default)]
    pub author_avatar_url: Option<String>,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub share_count: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_new: bool,
    #[serde(default)]
    pub is_burst: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "version")]
enum StoredDetail {
    #[serde(rename = "1")]
    V1(CachedDetail),
}

impl CachedDetail {
    pub fn from_post(post: &PostRow, score: &HotnessScore, avatar_base_url: &str) -> Self {
        Self {
            post_id: post.post_id,
            user_id: post.user_id,
            title: post.title.clone(),
            category_name: post.category_name.clone(),
            author_display_name: post.username.clone(),
            author_avatar_url: resolve_avatar_url(avatar_base_url, post.avatar.as_deref()),
            view_count: post.view_count,
            like_count: post.like_count,
            comment_count: post.comment_count,
            share_count: post.share_count,
            created_at: post.created_at,
            is_new: score.is_new,
            is_burst: score.is_burst,
        }
    }
}

/// A ranked item handed to callers: the detail plus its score and 1-based position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPost {
    #[serde(flatten)]
    pub detail: CachedDetail,
    pub hotness: f64,
    pub rank: u32,
}

pub fn encode(detail: &CachedDetail) -> Result<String, serde_json::Error> {
    serde_json::to_string(&StoredDetail::V1(detail.clone()))
}

pub fn decode(raw: &str) -> Result<CachedDetail, serde_json::Error> {
    match serde_json::from_str::<StoredDetail>(raw)? {
        StoredDetail::V1(detail) => Ok(detail),
    }
}

/// Joins the avatar file name onto the configured base. Blank names yield no avatar;
/// absolute URLs are kept as-is.
pub fn resolve_avatar_url(base_url: &str, avatar: Option<&str>) -> Option<String> {
    let avatar = avatar.map(str::trim).filter(|a| !a.is_empty())?;
    if avatar.starts_with("http://") || avatar.starts_with("https://") {
        return Some(avatar.to_string());
    }
    Some(format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        avatar.trim_start_matches('/')
    ))
}
