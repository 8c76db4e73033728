use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::{sync::RwLock, time::Instant};

use crate::error::Result;

/// When a source counts as blocked.
#[derive(Debug, Clone, Copy)]
pub struct AttemptPolicy {
    /// Failures at which the source is blocked.
    pub threshold: u32,
    /// How long after its last failure a source stays blocked.
    pub window: Duration,
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self {
            threshold: 5,
            window: Duration::from_secs(15 * 60),
        }
    }
}

/// Backing store for failure counters.
///
/// An entry whose last failure is older than `window` is stale: it reads as
/// zero failures and the next failure restarts it at 1.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Failures recorded for `key` that are still inside the window.
    async fn failures_within(&self, key: &str, now: Instant, window: Duration) -> Result<u32>;

    /// Records one failure and returns the updated count.
    async fn record_failure(&self, key: &str, now: Instant, window: Duration) -> Result<u32>;

    /// Forgets `key`.
    async fn clear(&self, key: &str) -> Result<()>;

    /// Evicts stale entries and returns how many were dropped.
    async fn purge_stale(&self, now: Instant, window: Duration) -> Result<usize>;
}

#[derive(Debug, Clone, Copy)]
struct AttemptEntry {
    attempts: u32,
    last_attempt: Instant,
}

impl AttemptEntry {
    fn is_stale(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.last_attempt) >= window
    }
}

/// Process-local attempt store.
///
/// Counters are not shared between instances of the service.
#[derive(Default)]
pub struct MemoryAttemptStore {
    entries: RwLock<HashMap<String, AttemptEntry>>,
}

impl MemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn failures_within(&self, key: &str, now: Instant, window: Duration) -> Result<u32> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_stale(now, window))
            .map_or(0, |entry| entry.attempts))
    }

    async fn record_failure(&self, key: &str, now: Instant, window: Duration) -> Result<u32> {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(key.to_string()).or_insert(AttemptEntry {
            attempts: 0,
            last_attempt: now,
        });
        if entry.is_stale(now, window) {
            entry.attempts = 0;
        }
        entry.attempts = entry.attempts.saturating_add(1);
        entry.last_attempt = now;
        Ok(entry.attempts)
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn purge_stale(&self, now: Instant, window: Duration) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_stale(now, window));
        Ok(before - entries.len())
    }
}

/// Redis-backed attempt store shared by every instance of the service.
///
/// Each failure runs `INCR` + `EXPIRE window` in one transaction, so the key
/// TTL is the staleness rule and Redis does the eviction.
#[derive(Clone)]
pub struct RedisAttemptStore {
    redis: ConnectionManager,
}

impl RedisAttemptStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl AttemptStore for RedisAttemptStore {
    async fn failures_within(&self, key: &str, _now: Instant, _window: Duration) -> Result<u32> {
        let count: Option<u32> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut self.redis.clone())
            .await?;
        Ok(count.unwrap_or(0))
    }

    async fn record_failure(&self, key: &str, _now: Instant, window: Duration) -> Result<u32> {
        let (count,): (u32,) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(key)
            .cmd("EXPIRE")
            .arg(key)
            .arg(window.as_secs().max(1))
            .ignore()
            .query_async(&mut self.redis.clone())
            .await?;
        Ok(count)
    }

    async fn clear(&self, key: &str) -> Result<()> {
        let _: () = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut self.redis.clone())
            .await?;
        Ok(())
    }

    async fn purge_stale(&self, _now: Instant, _window: Duration) -> Result<usize> {
        Ok(0)
    }
}

/// Failure counter for one kind of attempt (license checks, logins, ...).
///
/// Keys are `rate_limit:<scope>:<source>`.
#[derive(Clone)]
pub struct AttemptTracker {
    scope: &'static str,
    policy: AttemptPolicy,
    store: Arc<dyn AttemptStore>,
}

impl AttemptTracker {
    /// Creates a tracker for `scope` over `store`.
    pub fn new(scope: &'static str, policy: AttemptPolicy, store: Arc<dyn AttemptStore>) -> Self {
        Self { scope, policy, store }
    }

    /// A tracker backed by a fresh process-local store.
    pub fn in_memory(scope: &'static str, policy: AttemptPolicy) -> Self {
        Self::new(scope, policy, Arc::new(MemoryAttemptStore::new()))
    }

    pub fn scope(&self) -> &'static str {
        self.scope
    }

    pub fn policy(&self) -> AttemptPolicy {
        self.policy
    }

    fn key(&self, source: &str) -> String {
        format!("rate_limit:{}:{}", self.scope, source)
    }

    /// Whether `source` has reached the threshold inside the window.
    pub async fn is_blocked(&self, source: &str) -> Result<bool> {
        let failures = self
            .store
            .failures_within(&self.key(source), Instant::now(), self.policy.window)
            .await?;
        Ok(failures >= self.policy.threshold)
    }

    /// Counts one failure for `source`.
    pub async fn record_failure(&self, source: &str) -> Result<u32> {
        let attempts = self
            .store
            .record_failure(&self.key(source), Instant::now(), self.policy.window)
            .await?;
        if attempts == self.policy.threshold {
            tracing::warn!(
                "🚫 {} attempts from {} blocked for {}s",
                self.scope,
                source,
                self.policy.window.as_secs()
            );
        }
        Ok(attempts)
    }

    /// Forgets every failure of `source`.
    pub async fn reset(&self, source: &str) -> Result<()> {
        self.store.clear(&self.key(source)).await
    }

    /// Evicts stale entries.
    pub async fn purge_stale(&self) -> Result<usize> {
        self.store.purge_stale(Instant::now(), self.policy.window).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(900);

    #[tokio::test]
    async fn stale_entries_restart_at_one() {
        let store = MemoryAttemptStore::new();
        let start = Instant::now();
        for _ in 0..5 {
            store.record_failure("k", start, WINDOW).await.unwrap();
        }
        assert_eq!(store.failures_within("k", start, WINDOW).await.unwrap(), 5);

        let later = start + WINDOW;
        assert_eq!(store.failures_within("k", later, WINDOW).await.unwrap(), 0);
        assert_eq!(store.record_failure("k", later, WINDOW).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn purge_drops_only_stale_entries() {
        let store = MemoryAttemptStore::new();
        let start = Instant::now();
        store.record_failure("old", start, WINDOW).await.unwrap();
        store
            .record_failure("fresh", start + Duration::from_secs(600), WINDOW)
            .await
            .unwrap();

        let purged = store
            .purge_stale(start + Duration::from_secs(901), WINDOW)
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert_eq!(
            store
                .failures_within("fresh", start + Duration::from_secs(901), WINDOW)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn tracker_blocks_at_threshold_and_resets() {
        let tracker = AttemptTracker::in_memory("license", AttemptPolicy::default());
        for _ in 0..4 {
            tracker.record_failure("10.0.0.1").await.unwrap();
        }
        assert!(!tracker.is_blocked("10.0.0.1").await.unwrap());
        tracker.record_failure("10.0.0.1").await.unwrap();
        assert!(tracker.is_blocked("10.0.0.1").await.unwrap());
        assert!(!tracker.is_blocked("10.0.0.2").await.unwrap());

        tracker.reset("10.0.0.1").await.unwrap();
        assert!(!tracker.is_blocked("10.0.0.1").await.unwrap());
    }

    #[tokio::test]
    async fn scopes_do_not_share_counters() {
        let store: Arc<dyn AttemptStore> = Arc::new(MemoryAttemptStore::new());
        let policy = AttemptPolicy { threshold: 1, window: WINDOW };
        let license = AttemptTracker::new("license", policy, store.clone());
        let login = AttemptTracker::new("login", policy, store);

        license.record_failure("ip").await.unwrap();
        assert!(license.is_blocked("ip").await.unwrap());
        assert!(!login.is_blocked("ip").await.unwrap());
    }
}
