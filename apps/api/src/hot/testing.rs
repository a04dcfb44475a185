//! In-memory collaborators for unit tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;

use crate::hot::clock::Clock;
use crate::hot::queue::{MessageQueue, QueueError, RecomputeJob};
use crate::hot::repository::{PostRepository, RepositoryError};
use crate::hot::store::{CacheError, RankEntry, RankedCacheStore};
use crate::models::post::PostRow;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 27, 8, 0, 0).unwrap()
}

/// A published post created at [`t0`].
pub fn post(post_id: i64, views: i64, likes: i64, comments: i64, shares: i64) -> PostRow {
    PostRow {
        post_id,
        user_id: 100 + post_id,
        title: format!("Post #{post_id}"),
        category_name: Some("Campus Life".to_string()),
        username: Some(format!("student{post_id}")),
        avatar: Some(format!("avatar{post_id}.png")),
        view_count: views,
        like_count: likes,
        comment_count: comments,
        share_count: shares,
        created_at: t0(),
    }
}

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

fn unavailable() -> CacheError {
    CacheError::Redis(redis::RedisError::from((
        redis::ErrorKind::IoError,
        "connection refused",
    )))
}

#[derive(Default)]
pub struct InMemoryPostRepository {
    posts: Mutex<BTreeMap<i64, PostRow>>,
    get_calls: AtomicUsize,
    list_calls: AtomicUsize,
    last_list_n: Mutex<Option<usize>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl InMemoryPostRepository {
    pub fn new(posts: Vec<PostRow>) -> Self {
        let repo = Self::default();
        for p in posts {
            repo.insert(p);
        }
        repo
    }

    pub fn insert(&self, post: PostRow) {
        self.posts.lock().unwrap().insert(post.post_id, post);
    }

    pub fn remove(&self, post_id: i64) {
        self.posts.lock().unwrap().remove(&post_id);
    }

    pub fn row(&self, post_id: i64) -> Option<PostRow> {
        self.posts.lock().unwrap().get(&post_id).cloned()
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn last_list_n(&self) -> Option<usize> {
        *self.last_list_n.lock().unwrap()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    async fn simulate(&self) -> Result<(), RepositoryError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl PostRepository for InMemoryPostRepository {
    async fn get_by_id(&self, post_id: i64) -> Result<Option<PostRow>, RepositoryError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;
        Ok(self.row(post_id))
    }

    async fn list_latest(&self, n: usize) -> Result<Vec<PostRow>, RepositoryError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_list_n.lock().unwrap() = Some(n);
        self.simulate().await?;
        let mut rows: Vec<PostRow> = self.posts.lock().unwrap().values().cloned().collect();
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.post_id.cmp(&a.post_id))
        });
        rows.truncate(n);
        Ok(rows)
    }
}

/// Sorted sets and strings behind plain mutexes; each call is atomic per key.
#[derive(Default)]
pub struct InMemoryRankedStore {
    zsets: Mutex<HashMap<String, HashMap<i64, f64>>>,
    strings: Mutex<HashMap<String, String>>,
    ttls: Mutex<HashMap<String, Duration>>,
    unavailable: AtomicBool,
}

impl InMemoryRankedStore {
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn score_of(&self, key: &str, post_id: i64) -> Option<f64> {
        self.zsets
            .lock()
            .unwrap()
            .get(key)
            .and_then(|set| set.get(&post_id).copied())
    }

    pub fn zcard_of(&self, key: &str) -> usize {
        self.zsets.lock().unwrap().get(key).map_or(0, HashMap::len)
    }

    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.ttls.lock().unwrap().get(key).copied()
    }

    pub fn string_of(&self, key: &str) -> Option<String> {
        self.strings.lock().unwrap().get(key).cloned()
    }

    pub fn put_string(&self, key: &str, value: &str) {
        self.strings
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn remove_string(&self, key: &str) {
        self.strings.lock().unwrap().remove(key);
    }

    /// Drops a key entirely, as if its TTL had elapsed.
    pub fn expire_now(&self, key: &str) {
        self.zsets.lock().unwrap().remove(key);
        self.strings.lock().unwrap().remove(key);
        self.ttls.lock().unwrap().remove(key);
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(())
    }

    fn exists(&self, key: &str) -> bool {
        self.zsets.lock().unwrap().contains_key(key) || self.strings.lock().unwrap().contains_key(key)
    }
}

#[async_trait]
impl RankedCacheStore for InMemoryRankedStore {
    async fn zupsert(&self, key: &str, post_id: i64, score: f64) -> Result<(), CacheError> {
        self.check()?;
        self.zsets
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .insert(post_id, score);
        Ok(())
    }

    async fn zrange_desc(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<RankEntry>, CacheError> {
        self.check()?;
        let zsets = self.zsets.lock().unwrap();
        let Some(set) = zsets.get(key) else {
            return Ok(Vec::new());
        };
        let mut entries: Vec<RankEntry> = set
            .iter()
            .map(|(&post_id, &score)| RankEntry { post_id, score })
            .collect();
        // ZREVRANGE orders equal scores by member, reverse lexicographically.
        entries.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.post_id.to_string().cmp(&a.post_id.to_string()))
        });
        Ok(entries
            .into_iter()
            .skip(start)
            .take(stop.saturating_sub(start) + 1)
            .collect())
    }

    async fn zrange_by_score(&self, key: &str, score: f64) -> Result<Vec<RankEntry>, CacheError> {
        self.check()?;
        let zsets = self.zsets.lock().unwrap();
        let mut entries: Vec<RankEntry> = zsets
            .get(key)
            .map(|set| {
                set.iter()
                    .filter(|(_, &s)| s == score)
                    .map(|(&post_id, &score)| RankEntry { post_id, score })
                    .collect()
            })
            .unwrap_or_default();
        // ZRANGEBYSCORE orders equal scores by member, lexicographically.
        entries.sort_by_key(|e| e.post_id.to_string());
        Ok(entries)
    }

    async fn zcard(&self, key: &str) -> Result<usize, CacheError> {
        self.check()?;
        Ok(self.zcard_of(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.check()?;
        self.put_string(key, value);
        self.ttls.lock().unwrap().insert(key.to_string(), ttl);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check()?;
        Ok(self.string_of(key))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        self.check()?;
        if self.exists(key) {
            self.ttls.lock().unwrap().insert(key.to_string(), ttl);
        }
        Ok(())
    }

    async fn expire_if_unset(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        self.check()?;
        if self.exists(key) {
            self.ttls
                .lock()
                .unwrap()
                .entry(key.to_string())
                .or_insert(ttl);
        }
        Ok(())
    }
}

/// Competing-consumer queue: every published job reaches exactly one subscriber.
#[derive(Default)]
pub struct InMemoryQueue {
    topics: Mutex<HashMap<String, VecDeque<RecomputeJob>>>,
    failing: AtomicBool,
    published: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl InMemoryQueue {
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn published(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }

    pub fn pending(&self, topic: &str) -> Vec<i64> {
        self.topics
            .lock()
            .unwrap()
            .get(topic)
            .map(|q| q.iter().map(|j| j.post_id).collect())
            .unwrap_or_default()
    }

    fn pop(&self, topic: &str) -> Option<RecomputeJob> {
        self.topics
            .lock()
            .unwrap()
            .get_mut(topic)
            .and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn publish(&self, topic: &str, job: &RecomputeJob) -> Result<(), QueueError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(QueueError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "broker unreachable",
            ))));
        }
        self.topics
            .lock()
            .unwrap()
            .entry(topic.to_string())
            .or_default()
            .push_back(*job);
        self.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Hands every job pending at call time to this subscriber, then closes the channel.
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<RecomputeJob>, QueueError> {
        let mut jobs = Vec::new();
        while let Some(job) = self.pop(topic) {
            jobs.push(job);
        }
        let (tx, rx) = mpsc::channel(jobs.len().max(1));
        for job in jobs {
            let _ = tx.try_send(job);
        }
        Ok(rx)
    }
}
