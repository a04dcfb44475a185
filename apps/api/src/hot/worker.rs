//! Recompute worker: consumes jobs one at a time and upserts fresh scores.
//!
//! Any number of workers may share a topic. Jobs for the same post can run concurrently or
//! out of order; the cache resolves that with last-write-wins. Failures are logged and the
//! job is dropped: the broker's redelivery is the only retry.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::hot::clock::Clock;
use crate::hot::manager::RankingCacheManager;
use crate::hot::queue::RecomputeJob;
use crate::hot::repository::PostRepository;
use crate::hot::scorer::{HotnessScore, HotnessScorer};

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Updated(HotnessScore),
    /// The post vanished between dispatch and processing.
    Dropped,
    Failed,
}

pub struct RecomputeWorker {
    id: usize,
    repo: Arc<dyn PostRepository>,
    manager: Arc<RankingCacheManager>,
    scorer: HotnessScorer,
    clock: Arc<dyn Clock>,
}

impl RecomputeWorker {
    pub fn new(
        id: usize,
        repo: Arc<dyn PostRepository>,
        manager: Arc<RankingCacheManager>,
        scorer: HotnessScorer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            id,
            repo,
            manager,
            scorer,
            clock,
        }
    }

    pub async fn process(&self, job: &RecomputeJob) -> JobOutcome {
        let post_id = job.post_id;

        let post = match self.repo.get_by_id(post_id).await {
            Ok(Some(post)) => post,
            Ok(None) => {
                debug!(worker = self.id, post_id, "Post gone, dropping recompute job");
                return JobOutcome::Dropped;
            }
            Err(e) => {
                error!(worker = self.id, post_id, "Failed to load post for recompute: {e}");
                return JobOutcome::Failed;
            }
        };

        let score = self.scorer.score(&post.engagement(), self.clock.now());
        let detail = self.manager.project(&post, &score);

        match self.manager.upsert(&score, &detail).await {
            Ok(()) => {
                info!(
                    worker = self.id,
                    post_id,
                    score = score.score,
                    "Updated post hotness"
                );
                JobOutcome::Updated(score)
            }
            Err(e) => {
                error!(worker = self.id, post_id, "Failed to write post hotness: {e}");
                JobOutcome::Failed
            }
        }
    }

    /// Processes jobs until the channel closes or shutdown is signalled.
    /// Returns the number of jobs handled.
    pub async fn run(
        self,
        mut jobs: mpsc::Receiver<RecomputeJob>,
        mut shutdown: watch::Receiver<bool>,
    ) -> usize {
        info!(worker = self.id, "Hotness recompute worker started");
        let mut handled = 0;

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(worker = self.id, handled, "Hotness recompute worker stopping");
                        break;
                    }
                }
                job = jobs.recv() => match job {
                    Some(job) => {
                        self.process(&job).await;
                        handled += 1;
                    }
                    None => {
                        warn!(worker = self.id, handled, "Recompute queue closed");
                        break;
                    }
                }
            }
        }

        handled
    }
}
