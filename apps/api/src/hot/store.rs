//! Ranked cache store: a sorted set of `post_id → score` plus plain string values.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed sorted-set member: {0}")]
    MalformedMember(String),
}

/// One member of the ranked set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankEntry {
    pub post_id: i64,
    pub score: f64,
}

#[async_trait]
pub trait RankedCacheStore: Send + Sync {
    /// Inserts or overwrites the member's score. Last write wins.
    async fn zupsert(&self, key: &str, post_id: i64, score: f64) -> Result<(), CacheError>;

    /// Members ranked `start..=stop` (0-based) by score, highest first.
    async fn zrange_desc(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<RankEntry>, CacheError>;

    /// Every member whose score is exactly `score`.
    async fn zrange_by_score(&self, key: &str, score: f64) -> Result<Vec<RankEntry>, CacheError>;

    async fn zcard(&self, key: &str) -> Result<usize, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Sets a TTL only when the key exists without one.
    async fn expire_if_unset(&self, key: &str, ttl: Duration) -> Result<(), CacheError>;
}

/// Convenience: the top `n` members.
pub async fn ztop_n(
    store: &dyn RankedCacheStore,
    key: &str,
    n: usize,
) -> Result<Vec<RankEntry>, CacheError> {
    if n == 0 {
        return Ok(Vec::new());
    }
    store.zrange_desc(key, 0, n - 1).await
}

fn parse_members(raw: Vec<(String, f64)>) -> Result<Vec<RankEntry>, CacheError> {
    raw.into_iter()
        .map(|(member, score)| {
            member
                .parse::<i64>()
                .map(|post_id| RankEntry { post_id, score })
                .map_err(|_| CacheError::MalformedMember(member))
        })
        .collect()
}

/// Redis-backed store. All commands go through a shared multiplexed connection manager.
#[derive(Clone)]
pub struct RedisRankedStore {
    conn: ConnectionManager,
}

impl RedisRankedStore {
    pub async fn connect(client: redis::Client) -> Result<Self, CacheError> {
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        redis::cmd("PING")
            .query_async::<_, String>(&mut self.conn.clone())
            .await
            .map_err(|e| {
                warn!("Redis PING failed: {e}");
                CacheError::Redis(e)
            })?;
        Ok(())
    }
}

#[async_trait]
impl RankedCacheStore for RedisRankedStore {
    async fn zupsert(&self, key: &str, post_id: i64, score: f64) -> Result<(), CacheError> {
        redis::cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(post_id)
            .query_async::<_, ()>(&mut self.conn.clone())
            .await?;
        Ok(())
    }

    async fn zrange_desc(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<RankEntry>, CacheError> {
        let raw: Vec<(String, f64)> = redis::cmd("ZREVRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .arg("WITHSCORES")
            .query_async(&mut self.conn.clone())
            .await?;
        parse_members(raw)
    }

    async fn zrange_by_score(&self, key: &str, score: f64) -> Result<Vec<RankEntry>, CacheError> {
        let raw: Vec<(String, f64)> = redis::cmd("ZRANGEBYSCORE")
            .arg(key)
            .arg(score)
            .arg(score)
            .arg("WITHSCORES")
            .query_async(&mut self.conn.clone())
            .await?;
        parse_members(raw)
    }

    async fn zcard(&self, key: &str) -> Result<usize, CacheError> {
        let count: usize = redis::cmd("ZCARD")
            .arg(key)
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(count)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        redis::cmd("SETEX")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .arg(value)
            .query_async::<_, ()>(&mut self.conn.clone())
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut self.conn.clone())
            .await?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut self.conn.clone())
            .await?;
        Ok(())
    }

    async fn expire_if_unset(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        // NX requires Redis 7.0+.
        redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl.as_secs().max(1))
            .arg("NX")
            .query_async::<_, ()>(&mut self.conn.clone())
            .await?;
        Ok(())
    }
}
