//! In-memory token-bucket store and a pluggable distributed backend with
//! fallback (spec §4.2).

use super::{Decision, RateLimitStore};
use crate::clock::{Clock, MonotonicClock};
use crate::error::GatewayError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Entry {
    tokens: f64,
    last_refill_millis: u64,
}

/// Token bucket per key, sharded by `DashMap` for per-entry isolation. A
/// background task (see [`start_cleanup`](Self::start_cleanup)) drops
/// entries untouched for `stale_after` (default 24h).
pub struct InMemoryStore {
    entries: DashMap<String, Entry>,
    max_entries: usize,
    stale_after: Duration,
    clock: Arc<dyn Clock>,
    stopped: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new(max_entries: usize) -> Self {
        Self::with_clock(max_entries, Duration::from_secs(24 * 60 * 60), Arc::new(MonotonicClock::default()))
    }

    pub fn with_clock(max_entries: usize, stale_after: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { entries: DashMap::new(), max_entries, stale_after, clock, stopped: Arc::new(AtomicBool::new(false)) }
    }

    /// Enforces the max-entries cap by evicting the entry with the oldest
    /// `last_refill_millis` before a new key is inserted.
    fn evict_oldest_if_needed(&self, key: &str) {
        if self.entries.contains_key(key) || self.entries.len() < self.max_entries {
            return;
        }
        if let Some(oldest) = self.entries.iter().min_by_key(|e| e.value().last_refill_millis).map(|e| e.key().clone()) {
            self.entries.remove(&oldest);
        }
    }

    /// Spawns the 24h cleanup loop; returns a handle that stops it when dropped context permits.
    pub fn start_cleanup(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if store.stopped.load(Ordering::Acquire) {
                    break;
                }
                store.cleanup_stale();
            }
        })
    }

    pub fn stop_cleanup(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    fn cleanup_stale(&self) {
        let now = self.clock.now_millis();
        let stale_millis = self.stale_after.as_millis() as u64;
        self.entries.retain(|_, e| now.saturating_sub(e.last_refill_millis) < stale_millis);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryStore {
    async fn allow_n(&self, key: &str, n: u64, limit: f64, burst: u64, window: Duration) -> Result<Decision, GatewayError> {
        self.evict_oldest_if_needed(key);
        let now = self.clock.now_millis();
        let window_millis = window.as_millis() as u64;

        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry { tokens: burst as f64, last_refill_millis: now });

        let elapsed = now.saturating_sub(entry.last_refill_millis);
        if elapsed >= window_millis {
            entry.tokens = burst as f64;
            entry.last_refill_millis = now;
        } else if elapsed > 0 {
            let refill = limit * (elapsed as f64) / (window_millis.max(1) as f64);
            if refill > 0.0 {
                entry.tokens = (entry.tokens + refill).min(burst as f64);
                entry.last_refill_millis = now;
            }
        }

        let reset_at = now + window_millis;
        if entry.tokens >= n as f64 {
            entry.tokens -= n as f64;
            Ok(Decision { allowed: true, remaining: entry.tokens as u64, reset_at_millis: reset_at })
        } else {
            Ok(Decision { allowed: false, remaining: entry.tokens.max(0.0) as u64, reset_at_millis: reset_at })
        }
    }

    async fn reset(&self, key: &str) {
        self.entries.remove(key);
    }

    async fn close(&self) {
        self.stop_cleanup();
    }
}

/// Transport for the distributed (redis-style) backend. A real
/// implementation would issue the sliding-window Lua script described in
/// spec §4.2; this trait lets one be plugged in without this crate taking a
/// hard dependency on any specific client.
#[async_trait]
pub trait RemoteRateLimitTransport: Send + Sync {
    async fn allow_n(&self, key: &str, n: u64, limit: f64, burst: u64, window: Duration) -> Result<Decision, GatewayError>;
    async fn reset(&self, key: &str) -> Result<(), GatewayError>;
}

/// Sliding-window distributed store with fallback to an in-memory limiter
/// initialized with the same limit/burst on any transport error, so service
/// continues degraded (spec §4.2).
pub struct DistributedStore<T: RemoteRateLimitTransport> {
    transport: T,
    fallback: InMemoryStore,
}

impl<T: RemoteRateLimitTransport> DistributedStore<T> {
    pub fn new(transport: T, fallback_max_entries: usize) -> Self {
        Self { transport, fallback: InMemoryStore::new(fallback_max_entries) }
    }
}

#[async_trait]
impl<T: RemoteRateLimitTransport> RateLimitStore for DistributedStore<T> {
    async fn allow_n(&self, key: &str, n: u64, limit: f64, burst: u64, window: Duration) -> Result<Decision, GatewayError> {
        match self.transport.allow_n(key, n, limit, burst, window).await {
            Ok(decision) => Ok(decision),
            Err(err) => {
                tracing::warn!(error = %err, key, "distributed rate limiter unreachable, falling back to in-memory");
                self.fallback.allow_n(key, n, limit, burst, window).await
            }
        }
    }

    async fn reset(&self, key: &str) {
        if self.transport.reset(key).await.is_err() {
            self.fallback.reset(key).await;
        }
    }

    async fn close(&self) {
        self.fallback.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[derive(Debug, Clone)]
    struct ManualClock {
        now: Arc<AtomicU64>,
    }
    impl ManualClock {
        fn new() -> Self {
            Self { now: Arc::new(AtomicU64::new(0)) }
        }
        fn advance(&self, millis: u64) {
            self.now.fetch_add(millis, Ordering::SeqCst);
        }
    }
    impl Clock for ManualClock {
        fn now_millis(&self) -> u64 {
            self.now.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn admits_up_to_burst_then_denies() {
        let store = InMemoryStore::new(1000);
        for _ in 0..10 {
            let d = store.allow("k", 5.0, 10, Duration::from_secs(1)).await.unwrap();
            assert!(d.allowed);
        }
        let denied = store.allow("k", 5.0, 10, Duration::from_secs(1)).await.unwrap();
        assert!(!denied.allowed);
    }

    #[tokio::test]
    async fn refills_after_window_elapses() {
        let clock = Arc::new(ManualClock::new());
        let store = InMemoryStore::with_clock(1000, Duration::from_secs(3600), clock.clone());
        for _ in 0..10 {
            assert!(store.allow("k", 5.0, 10, Duration::from_secs(1)).await.unwrap().allowed);
        }
        assert!(!store.allow("k", 5.0, 10, Duration::from_secs(1)).await.unwrap().allowed);

        clock.advance(250);
        assert!(store.allow("k", 5.0, 10, Duration::from_secs(1)).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn distinct_keys_are_isolated() {
        let store = InMemoryStore::new(1000);
        for _ in 0..10 {
            assert!(store.allow("a", 5.0, 10, Duration::from_secs(1)).await.unwrap().allowed);
        }
        assert!(!store.allow("a", 5.0, 10, Duration::from_secs(1)).await.unwrap().allowed);
        assert!(store.allow("b", 5.0, 10, Duration::from_secs(1)).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn eviction_drops_oldest_entry_when_at_capacity() {
        let clock = Arc::new(ManualClock::new());
        let store = InMemoryStore::with_clock(2, Duration::from_secs(3600), clock.clone());
        store.allow("a", 1.0, 1, Duration::from_secs(1)).await.unwrap();
        clock.advance(10);
        store.allow("b", 1.0, 1, Duration::from_secs(1)).await.unwrap();
        clock.advance(10);
        store.allow("c", 1.0, 1, Duration::from_secs(1)).await.unwrap();
        assert_eq!(store.len(), 2);
        assert!(!store.entries.contains_key("a"), "oldest entry should have been evicted");
    }

    struct FailingTransport;
    #[async_trait]
    impl RemoteRateLimitTransport for FailingTransport {
        async fn allow_n(&self, _key: &str, _n: u64, _limit: f64, _burst: u64, _window: Duration) -> Result<Decision, GatewayError> {
            Err(GatewayError::internal("transport down"))
        }
        async fn reset(&self, _key: &str) -> Result<(), GatewayError> {
            Err(GatewayError::internal("transport down"))
        }
    }

    #[tokio::test]
    async fn distributed_store_falls_back_to_in_memory_on_transport_error() {
        let store = DistributedStore::new(FailingTransport, 1000);
        let decision = store.allow("k", 5.0, 10, Duration::from_secs(1)).await.unwrap();
        assert!(decision.allowed, "fallback in-memory store should admit the first request");
    }
}
