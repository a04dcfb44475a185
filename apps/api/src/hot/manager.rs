//! Ranking cache manager: owns the read/refresh protocol for the hot-post ranking.
//!
//! Read path: serve the top of the ranked set from the cache, hydrating each member from
//! its cached detail (or repairing a missing/malformed detail from the repository).
//! Cold or unreachable cache: rebuild synchronously from the latest posts, bounded by
//! `rebuild_timeout`. Readers never see a cache-layer error.
//!
//! Write path: [`RankingCacheManager::upsert`] does per-key writes, last write wins.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::hot::clock::Clock;
use crate::hot::detail::{self, CachedDetail, RankedPost};
use crate::hot::repository::PostRepository;
use crate::hot::scorer::{HotnessScore, HotnessScorer};
use crate::hot::store::{ztop_n, CacheError, RankEntry, RankedCacheStore};
use crate::models::post::PostRow;

pub const HOT_POSTS_KEY: &str = "hot:posts";
pub const HOT_POST_DETAIL_PREFIX: &str = "hot:post:detail:";
/// Deepest rank any read will serve or rebuild for.
pub const MAX_RANK_DEPTH: usize = 1000;

pub fn detail_key(post_id: i64) -> String {
    format!("{HOT_POST_DETAIL_PREFIX}{post_id}")
}

#[derive(Debug, Clone)]
pub struct RankingSettings {
    /// TTL on the ranked set and each detail entry.
    pub rank_ttl: Duration,
    /// Rebuild scans `limit × candidate_multiplier` latest posts.
    pub candidate_multiplier: usize,
    pub rebuild_timeout: Duration,
    /// Upper bound on each individual cache call.
    pub cache_timeout: Duration,
    pub avatar_base_url: String,
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self {
            rank_ttl: Duration::from_secs(3600),
            candidate_multiplier: 5,
            rebuild_timeout: Duration::from_millis(2000),
            cache_timeout: Duration::from_millis(500),
            avatar_base_url: "http://localhost:8081/avatars".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub has_more: bool,
}

impl<T> Page<T> {
    fn empty(page: usize, page_size: usize, total: usize) -> Self {
        Self {
            items: Vec::new(),
            page,
            page_size,
            total,
            has_more: false,
        }
    }
}

/// A hydrated member before ranks are assigned.
#[derive(Debug, Clone)]
struct Scored {
    detail: CachedDetail,
    score: f64,
}

pub struct RankingCacheManager {
    repo: Arc<dyn PostRepository>,
    store: Arc<dyn RankedCacheStore>,
    scorer: HotnessScorer,
    clock: Arc<dyn Clock>,
    settings: RankingSettings,
}

impl RankingCacheManager {
    pub fn new(
        repo: Arc<dyn PostRepository>,
        store: Arc<dyn RankedCacheStore>,
        scorer: HotnessScorer,
        clock: Arc<dyn Clock>,
        settings: RankingSettings,
    ) -> Self {
        Self {
            repo,
            store,
            scorer,
            clock,
            settings,
        }
    }

    /// Builds the cached projection of `post` for a freshly computed score.
    pub fn project(&self, post: &PostRow, score: &HotnessScore) -> CachedDetail {
        CachedDetail::from_post(post, score, &self.settings.avatar_base_url)
    }

    /// The `limit` hottest posts, score descending, ties by post id ascending.
    pub async fn top_posts(&self, limit: usize) -> Vec<RankedPost> {
        let limit = limit.min(MAX_RANK_DEPTH);
        if limit == 0 {
            return Vec::new();
        }

        let entries = match self.ranked_window(0, limit).await {
            Ok(entries) if !entries.is_empty() => entries,
            Ok(_) => {
                info!(limit, "Hot ranking cache is cold, rebuilding from repository");
                return self.rebuild(limit).await;
            }
            Err(e) => {
                warn!(limit, "Hot ranking cache unavailable, rebuilding from repository: {e}");
                return self.rebuild(limit).await;
            }
        };

        assign_ranks(self.hydrate(&entries).await, 0)
    }

    /// 1-based page of the ranking with the total number of ranked posts. Ranks past
    /// [`MAX_RANK_DEPTH`] are never served.
    pub async fn hot_page(&self, page: usize, page_size: usize) -> Page<RankedPost> {
        let page = page.max(1);
        let start = (page - 1).saturating_mul(page_size);
        let end = start.saturating_add(page_size).min(MAX_RANK_DEPTH);

        match self.bounded(self.store.zcard(HOT_POSTS_KEY)).await {
            Ok(total) if total > 0 => {
                if start >= end.min(total) {
                    return Page::empty(page, page_size, total);
                }
                match self.ranked_window(start, end).await {
                    Ok(entries) => {
                        return Page {
                            items: assign_ranks(self.hydrate(&entries).await, start),
                            page,
                            page_size,
                            total,
                            has_more: end < total.min(MAX_RANK_DEPTH),
                        };
                    }
                    Err(e) => warn!(page, page_size, "Hot ranking page read failed: {e}"),
                }
            }
            Ok(_) => info!(page, page_size, "Hot ranking cache is cold, rebuilding for page"),
            Err(e) => warn!(page, page_size, "Hot ranking cache unavailable: {e}"),
        }

        if start >= end {
            return Page::empty(page, page_size, 0);
        }
        let ranked = self.rebuild_bounded(end).await;
        let total = ranked.len();
        let items = ranked.into_iter().skip(start).take(end - start).collect();
        Page {
            items: assign_ranks(items, start),
            page,
            page_size,
            total,
            has_more: end < total.min(MAX_RANK_DEPTH),
        }
    }

    /// The hottest posts currently in a comment burst.
    pub async fn burst_posts(&self, limit: usize) -> Vec<RankedPost> {
        let candidates = self
            .top_posts(limit.saturating_mul(self.settings.candidate_multiplier))
            .await;
        let bursting = candidates
            .into_iter()
            .filter(|p| p.detail.is_burst)
            .take(limit)
            .map(|p| Scored {
                score: p.hotness,
                detail: p.detail,
            })
            .collect();
        assign_ranks(bursting, 0)
    }

    /// Writes a freshly computed score and its detail. No coupling between the two writes;
    /// readers repair a missing detail.
    pub async fn upsert(&self, score: &HotnessScore, detail: &CachedDetail) -> Result<(), CacheError> {
        self.bounded(self.store.zupsert(HOT_POSTS_KEY, score.post_id, score.score))
            .await?;
        // A worker may recreate the set after it expired; keep it expiring.
        self.bounded(self.store.expire_if_unset(HOT_POSTS_KEY, self.settings.rank_ttl))
            .await?;
        self.write_detail(detail).await
    }

    async fn write_detail(&self, detail: &CachedDetail) -> Result<(), CacheError> {
        let payload = detail::encode(detail)?;
        self.bounded(self.store.set(
            &detail_key(detail.post_id),
            &payload,
            self.settings.rank_ttl,
        ))
        .await
    }

    async fn hydrate(&self, entries: &[RankEntry]) -> Vec<Scored> {
        let now = self.clock.now();
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let cached = match self.bounded(self.store.get(&detail_key(entry.post_id))).await {
                Ok(Some(raw)) => match detail::decode(&raw) {
                    Ok(detail) if detail.post_id == entry.post_id => Some(detail),
                    Ok(detail) => {
                        warn!(
                            post_id = entry.post_id,
                            cached_post_id = detail.post_id,
                            "Cached detail belongs to another post, repairing"
                        );
                        None
                    }
                    Err(e) => {
                        warn!(post_id = entry.post_id, "Malformed cached detail, repairing: {e}");
                        None
                    }
                },
                Ok(None) => None,
                Err(e) => {
                    warn!(post_id = entry.post_id, "Cached detail read failed: {e}");
                    None
                }
            };

            let detail = match cached {
                Some(detail) => Some(detail),
                None => self.repair_detail(entry.post_id).await,
            };

            if let Some(mut detail) = detail {
                self.refresh_flags(&mut detail, now);
                out.push(Scored {
                    detail,
                    score: entry.score,
                });
            }
        }
        out
    }

    /// Age-dependent flags go stale while a detail sits in the cache.
    fn refresh_flags(&self, detail: &mut CachedDetail, now: DateTime<Utc>) {
        detail.is_burst = self
            .scorer
            .is_burst(detail.comment_count, detail.created_at, now);
        detail.is_new = self.scorer.is_new(detail.created_at, now);
    }

    /// Ranks `start..end` (0-based), score descending, ties by post id ascending. Redis breaks
    /// ties by member bytes, so every member tied with the last one fetched is pulled in
    /// before cutting.
    async fn ranked_window(&self, start: usize, end: usize) -> Result<Vec<RankEntry>, CacheError> {
        let mut entries = self
            .bounded(ztop_n(self.store.as_ref(), HOT_POSTS_KEY, end))
            .await?;

        if entries.len() == end {
            if let Some(boundary) = entries.last().map(|e| e.score) {
                let ties = self
                    .bounded(self.store.zrange_by_score(HOT_POSTS_KEY, boundary))
                    .await?;
                let seen: HashSet<i64> = entries.iter().map(|e| e.post_id).collect();
                entries.extend(ties.into_iter().filter(|t| !seen.contains(&t.post_id)));
            }
        }

        entries.sort_by(|a, b| hotness_order((a.score, a.post_id), (b.score, b.post_id)));
        entries.truncate(end);
        Ok(entries.split_off(start.min(entries.len())))
    }

    /// Single-post repository lookup for a ranked member whose detail is missing.
    async fn repair_detail(&self, post_id: i64) -> Option<CachedDetail> {
        let post = match self.repo.get_by_id(post_id).await {
            Ok(Some(post)) => post,
            Ok(None) => {
                debug!(post_id, "Ranked post no longer exists, skipping");
                return None;
            }
            Err(e) => {
                warn!(post_id, "Repository lookup for detail repair failed: {e}");
                return None;
            }
        };

        let score = self.scorer.score(&post.engagement(), self.clock.now());
        let detail = self.project(&post, &score);
        if let Err(e) = self.write_detail(&detail).await {
            warn!(post_id, "Detail write-back failed: {e}");
        }
        Some(detail)
    }

    async fn rebuild(&self, limit: usize) -> Vec<RankedPost> {
        let mut ranked = self.rebuild_bounded(limit).await;
        ranked.truncate(limit);
        assign_ranks(ranked, 0)
    }

    /// Scores the latest `limit × multiplier` posts and repopulates the cache. Returns the
    /// whole scored set, sorted. Bounded by `rebuild_timeout`: a slow repository yields an
    /// empty ranking, a slow cache leaves a partially populated one.
    async fn rebuild_bounded(&self, limit: usize) -> Vec<Scored> {
        let deadline = Instant::now() + self.settings.rebuild_timeout;
        let candidates = limit
            .min(MAX_RANK_DEPTH)
            .saturating_mul(self.settings.candidate_multiplier);

        let posts = match timeout_at(deadline, self.repo.list_latest(candidates)).await {
            Ok(Ok(posts)) => posts,
            Ok(Err(e)) => {
                error!(candidates, "Hot ranking rebuild failed to load posts: {e}");
                return Vec::new();
            }
            Err(_) => {
                error!(
                    candidates,
                    "Hot ranking rebuild timed out after {:?}", self.settings.rebuild_timeout
                );
                return Vec::new();
            }
        };

        let now = self.clock.now();
        let mut scored = Vec::with_capacity(posts.len());
        let mut writes = Vec::with_capacity(posts.len());
        for post in &posts {
            let score = self.scorer.score(&post.engagement(), now);
            let detail = self.project(post, &score);
            writes.push((score, detail.clone()));
            scored.push(Scored {
                detail,
                score: score.score,
            });
        }

        match timeout_at(deadline, self.populate(&writes)).await {
            Ok(Ok(())) => info!(posts = writes.len(), "Hot ranking cache rebuilt"),
            Ok(Err(e)) => warn!("Hot ranking cache repopulation stopped: {e}"),
            Err(_) => warn!("Hot ranking cache repopulation timed out, cache left partial"),
        }

        sort_by_hotness(&mut scored);
        scored
    }

    async fn populate(&self, writes: &[(HotnessScore, CachedDetail)]) -> Result<(), CacheError> {
        if writes.is_empty() {
            return Ok(());
        }
        for (score, detail) in writes {
            self.bounded(self.store.zupsert(HOT_POSTS_KEY, score.post_id, score.score))
                .await?;
            self.write_detail(detail).await?;
        }
        self.bounded(self.store.expire(HOT_POSTS_KEY, self.settings.rank_ttl))
            .await
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        let limit = self.settings.cache_timeout;
        timeout(limit, fut)
            .await
            .map_err(|_| CacheError::Timeout(limit))?
    }
}

fn hotness_order((a_score, a_id): (f64, i64), (b_score, b_id): (f64, i64)) -> Ordering {
    b_score.total_cmp(&a_score).then_with(|| a_id.cmp(&b_id))
}

fn sort_by_hotness(items: &mut [Scored]) {
    items.sort_by(|a, b| {
        hotness_order((a.score, a.detail.post_id), (b.score, b.detail.post_id))
    });
}

fn assign_ranks(items: Vec<Scored>, offset: usize) -> Vec<RankedPost> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, s)| RankedPost {
            detail: s.detail,
            hotness: s.score,
            rank: u32::try_from(offset.saturating_add(i + 1)).unwrap_or(u32::MAX),
        })
        .collect()
}
