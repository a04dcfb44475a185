//! Message queue carrying recompute jobs.
//!
//! Delivery is at-least-once with no ordering guarantee across messages. Several
//! subscribers on one topic compete for jobs; each job goes to one of them.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// "Recompute this post": the only message this subsystem exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecomputeJob {
    pub post_id: i64,
    pub enqueued_at: DateTime<Utc>,
}

impl RecomputeJob {
    pub fn new(post_id: i64) -> Self {
        Self {
            post_id,
            enqueued_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn publish(&self, topic: &str, job: &RecomputeJob) -> Result<(), QueueError>;

    /// Opens a consumer on `topic`. The channel closes when the underlying
    /// connection is lost for good.
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<RecomputeJob>, QueueError>;
}

const SUBSCRIBER_BUFFER: usize = 1;
const POLL_TIMEOUT_SECS: f64 = 5.0;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Redis list used as a work queue: `LPUSH` to publish, `BRPOP` to consume.
/// Publishes share one managed connection; each subscriber gets its own.
#[derive(Clone)]
pub struct RedisListQueue {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisListQueue {
    pub async fn connect(client: redis::Client) -> Result<Self, QueueError> {
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl MessageQueue for RedisListQueue {
    async fn publish(&self, topic: &str, job: &RecomputeJob) -> Result<(), QueueError> {
        let payload = serde_json::to_string(job)?;
        redis::cmd("LPUSH")
            .arg(topic)
            .arg(payload)
            .query_async::<_, ()>(&mut self.conn.clone())
            .await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<RecomputeJob>, QueueError> {
        // A dedicated connection: BRPOP blocks the connection it runs on.
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let client = self.client.clone();
        let topic = topic.to_string();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);

        tokio::spawn(async move {
            loop {
                let popped: Result<Option<(String, String)>, redis::RedisError> = redis::cmd("BRPOP")
                    .arg(&topic)
                    .arg(POLL_TIMEOUT_SECS)
                    .query_async(&mut conn)
                    .await;

                match popped {
                    Ok(Some((_, payload))) => match serde_json::from_str::<RecomputeJob>(&payload) {
                        Ok(job) => {
                            if tx.send(job).await.is_err() {
                                debug!(topic = %topic, "Subscriber dropped, stopping consumer");
                                return;
                            }
                        }
                        Err(e) => warn!(topic = %topic, "Discarding malformed job payload: {e}"),
                    },
                    Ok(None) => {
                        if tx.is_closed() {
                            return;
                        }
                    }
                    Err(e) => {
                        error!(topic = %topic, "BRPOP failed: {e}");
                        tokio::time::sleep(RECONNECT_DELAY).await;
                        match client.get_multiplexed_async_connection().await {
                            Ok(fresh) => conn = fresh,
                            Err(e) => warn!(topic = %topic, "Redis reconnect failed: {e}"),
                        }
                        if tx.is_closed() {
                            return;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}
