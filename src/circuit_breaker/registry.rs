//! Keyed circuit breaker registry: at-most-one breaker per key, materialized
//! lazily on first use (spec §4.3).

use super::{CircuitBreaker, CircuitBreakerConfig};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A concurrent map from breaker key to breaker, with load-or-store
/// semantics so concurrent first-requests for the same key share one
/// breaker instance.
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
    stopped: Arc<AtomicBool>,
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self { breakers: DashMap::new(), default_config, stopped: Arc::new(AtomicBool::new(false)) }
    }

    /// Spawns the periodic rotation ticker that drives `rotate_all` (spec
    /// §4.3/§8 property 7: "while closed, a background ticker clears
    /// failures and successes every Interval"). Mirrors
    /// `InMemoryStore::start_cleanup`'s spawn-with-stop-flag shape.
    pub fn start(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if registry.stopped.load(Ordering::Acquire) {
                    break;
                }
                registry.rotate_all();
            }
        })
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Returns the breaker for `key`, creating it with the default config on
    /// first access.
    pub fn get_or_create(&self, key: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(key) {
            return existing.clone();
        }
        self.breakers
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.default_config.clone())))
            .clone()
    }

    /// Same as [`get_or_create`](Self::get_or_create) but with a
    /// per-key override config used only if the breaker doesn't exist yet.
    pub fn get_or_create_with(&self, key: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(key) {
            return existing.clone();
        }
        self.breakers.entry(key.to_string()).or_insert_with(|| Arc::new(CircuitBreaker::new(config))).clone()
    }

    /// Runs periodic counter rotation across all materialized breakers.
    /// Intended to be called from a background ticker.
    pub fn rotate_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().rotate_if_due();
        }
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
