use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::hot::manager::RankingSettings;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub port: u16,
    pub rust_log: String,
    pub hot_rank_ttl_secs: u64,
    pub hot_candidate_multiplier: usize,
    pub hot_rebuild_timeout_ms: u64,
    pub hot_cache_timeout_ms: u64,
    pub hot_worker_count: usize,
    pub hot_queue_topic: String,
    pub hot_publish_timeout_ms: u64,
    pub avatar_base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            hot_rank_ttl_secs: env_or("HOT_RANK_TTL_SECS", 3600)?,
            hot_candidate_multiplier: env_or("HOT_CANDIDATE_MULTIPLIER", 5)?,
            hot_rebuild_timeout_ms: env_or("HOT_REBUILD_TIMEOUT_MS", 2000)?,
            hot_cache_timeout_ms: env_or("HOT_CACHE_TIMEOUT_MS", 500)?,
            hot_worker_count: env_or("HOT_WORKER_COUNT", 2)?,
            hot_queue_topic: std::env::var("HOT_QUEUE_TOPIC")
                .unwrap_or_else(|_| "hot.post.queue".to_string()),
            hot_publish_timeout_ms: env_or("HOT_PUBLISH_TIMEOUT_MS", 500)?,
            avatar_base_url: std::env::var("AVATAR_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8081/avatars".to_string()),
        })
    }

    pub fn ranking_settings(&self) -> RankingSettings {
        RankingSettings {
            rank_ttl: Duration::from_secs(self.hot_rank_ttl_secs),
            candidate_multiplier: self.hot_candidate_multiplier.max(1),
            rebuild_timeout: Duration::from_millis(self.hot_rebuild_timeout_ms),
            cache_timeout: Duration::from_millis(self.hot_cache_timeout_ms),
            avatar_base_url: self.avatar_base_url.clone(),
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}
