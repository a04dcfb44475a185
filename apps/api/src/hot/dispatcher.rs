use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};

use crate::hot::queue::{MessageQueue, RecomputeJob};

pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_millis(500);

/// Fire-and-forget publisher of recompute jobs. A lost signal only delays freshness until
/// the next rebuild, so publish failures are logged and never reach the caller.
#[derive(Clone)]
pub struct RecomputeDispatcher {
    queue: Arc<dyn MessageQueue>,
    topic: String,
    publish_timeout: Duration,
}

impl RecomputeDispatcher {
    pub fn new(queue: Arc<dyn MessageQueue>, topic: impl Into<String>) -> Self {
        Self {
            queue,
            topic: topic.into(),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    pub fn with_publish_timeout(mut self, publish_timeout: Duration) -> Self {
        self.publish_timeout = publish_timeout;
        self
    }

    /// Returns whether the job reached the queue within the publish timeout.
    pub async fn enqueue(&self, post_id: i64) -> bool {
        self.publish_before(post_id, Instant::now() + self.publish_timeout)
            .await
    }

    /// Queues every id independently; one failure does not stop the rest. The whole batch
    /// shares one publish deadline. Returns how many were published.
    pub async fn enqueue_batch(&self, post_ids: &[i64]) -> usize {
        let deadline = Instant::now() + self.publish_timeout;
        let mut published = 0;
        for &post_id in post_ids {
            if self.publish_before(post_id, deadline).await {
                published += 1;
            }
        }
        info!(
            requested = post_ids.len(),
            published,
            "Batch hotness recompute queued"
        );
        published
    }

    async fn publish_before(&self, post_id: i64, deadline: Instant) -> bool {
        let job = RecomputeJob::new(post_id);
        match timeout_at(deadline, self.queue.publish(&self.topic, &job)).await {
            Ok(Ok(())) => {
                info!(post_id, topic = %self.topic, "Queued hotness recompute");
                true
            }
            Ok(Err(e)) => {
                error!(post_id, topic = %self.topic, "Failed to queue hotness recompute: {e}");
                false
            }
            Err(_) => {
                warn!(
                    post_id,
                    topic = %self.topic,
                    "Queueing hotness recompute timed out after {:?}", self.publish_timeout
                );
                false
            }
        }
    }
}
