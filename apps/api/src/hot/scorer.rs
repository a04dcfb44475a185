//! Hotness scoring: a pure function from an engagement snapshot to a score.
//!
//! score = (0.2·views + 0.3·likes + 0.25·comments + 0.1·shares)
//!         · 0.2^(age_hours / 24)
//!         · (1.5 if comments > 100 within the first 24h else 1.0)
//!
//! The weights deliberately sum to less than 1 so the burst multiplier has headroom.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Read-only view of a post's counters at read time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngagementSnapshot {
    pub post_id: i64,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub share_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HotnessScore {
    pub post_id: i64,
    pub score: f64,
    pub computed_at: DateTime<Utc>,
    pub is_burst: bool,
    pub is_new: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringParams {
    pub view_weight: f64,
    pub like_weight: f64,
    pub comment_weight: f64,
    pub share_weight: f64,
    /// Fraction of the score retained per day of age. Must be in (0, 1).
    pub decay_factor: f64,
    pub burst_comment_threshold: i64,
    pub burst_window_hours: f64,
    pub burst_multiplier: f64,
    /// Posts younger than this are flagged as new.
    pub new_window_hours: f64,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            view_weight: 0.2,
            like_weight: 0.3,
            comment_weight: 0.25,
            share_weight: 0.1,
            decay_factor: 0.2,
            burst_comment_threshold: 100,
            burst_window_hours: 24.0,
            burst_multiplier: 1.5,
            new_window_hours: 24.0,
        }
    }
}

/// Stateless scorer. Cloning is cheap; every worker and the cache manager hold their own.
#[derive(Debug, Clone, Default)]
pub struct HotnessScorer {
    params: ScoringParams,
}

impl HotnessScorer {
    /// Scores a snapshot as of `now`. Total: never fails, never negative.
    pub fn score(&self, snapshot: &EngagementSnapshot, now: DateTime<Utc>) -> HotnessScore {
        let p = &self.params;

        let views = snapshot.view_count.max(0) as f64;
        let likes = snapshot.like_count.max(0) as f64;
        let comments = snapshot.comment_count.max(0);
        let shares = snapshot.share_count.max(0) as f64;

        let base = p.view_weight * views
            + p.like_weight * likes
            + p.comment_weight * comments as f64
            + p.share_weight * shares;

        // Clock skew can put created_at in the future.
        let age_hours = age_in_hours(snapshot.created_at, now).max(0.0);
        let decay = p.decay_factor.powf(age_hours / 24.0);

        let is_burst = self.is_burst(comments, snapshot.created_at, now);
        let multiplier = if is_burst { p.burst_multiplier } else { 1.0 };

        let score = (base * decay * multiplier).max(0.0);

        tracing::debug!(
            post_id = snapshot.post_id,
            base,
            decay,
            multiplier,
            score,
            "computed hotness"
        );

        HotnessScore {
            post_id: snapshot.post_id,
            score,
            computed_at: now,
            is_burst,
            is_new: self.is_new(snapshot.created_at, now),
        }
    }

    /// Whether a post with `comment_count` comments is inside its burst window at `now`.
    pub fn is_burst(&self, comment_count: i64, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        comment_count > self.params.burst_comment_threshold
            && age_in_hours(created_at, now).max(0.0) <= self.params.burst_window_hours
    }

    pub fn is_new(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        age_in_hours(created_at, now).max(0.0) <= self.params.new_window_hours
    }
}

fn age_in_hours(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - created_at).num_milliseconds() as f64 / 3_600_000.0
}
