//! Retry budget: sliding-window guard against retry storms (spec §4.4).

use crate::clock::{Clock, MonotonicClock};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Window {
    start_millis: u64,
}

/// `CanRetry()` is true when `requests < min_requests` OR
/// `retries < requests * ratio`. The window rotates (zeroing both counters)
/// once `window` has elapsed since `window_start`.
pub struct RetryBudget {
    ratio: f64,
    min_requests: u64,
    window: Duration,
    requests: AtomicU64,
    retries: AtomicU64,
    rotation: Mutex<Window>,
    clock: Arc<dyn Clock>,
}

impl RetryBudget {
    pub fn new(ratio: f64, min_requests: u64, window: Duration) -> Self {
        Self::with_clock(ratio, min_requests, window, Arc::new(MonotonicClock::default()))
    }

    pub fn with_clock(ratio: f64, min_requests: u64, window: Duration, clock: Arc<dyn Clock>) -> Self {
        let start = clock.now_millis();
        Self {
            ratio,
            min_requests,
            window,
            requests: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            rotation: Mutex::new(Window { start_millis: start }),
            clock,
        }
    }

    /// Default knobs per spec §4.4: ratio 0.1, min-requests 10, window 1 minute.
    pub fn default_config() -> Self {
        Self::new(0.1, 10, Duration::from_secs(60))
    }

    fn maybe_rotate(&self) {
        let mut window = self.rotation.lock();
        let elapsed = self.clock.now_millis().saturating_sub(window.start_millis);
        if elapsed >= self.window.as_millis() as u64 {
            self.requests.store(0, Ordering::SeqCst);
            self.retries.store(0, Ordering::SeqCst);
            window.start_millis = self.clock.now_millis();
        }
    }

    pub fn record_request(&self) {
        self.maybe_rotate();
        self.requests.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_retry(&self) {
        self.maybe_rotate();
        self.retries.fetch_add(1, Ordering::SeqCst);
    }

    pub fn can_retry(&self) -> bool {
        self.maybe_rotate();
        let requests = self.requests.load(Ordering::SeqCst);
        let retries = self.retries.load(Ordering::SeqCst);
        requests < self.min_requests || (retries as f64) < (requests as f64) * self.ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64 as StdAtomicU64;

    #[derive(Debug, Clone)]
    struct ManualClock {
        now: Arc<StdAtomicU64>,
    }
    impl ManualClock {
        fn new() -> Self {
            Self { now: Arc::new(StdAtomicU64::new(0)) }
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

    #[test]
    fn allows_retries_below_min_requests() {
        let budget = RetryBudget::new(0.1, 10, Duration::from_secs(60));
        for _ in 0..5 {
            budget.record_request();
        }
        assert!(budget.can_retry());
    }

    #[test]
    fn denies_retries_once_ratio_exceeded_past_min_requests() {
        let budget = RetryBudget::new(0.1, 10, Duration::from_secs(60));
        for _ in 0..10 {
            budget.record_request();
        }
        budget.record_retry();
        assert!(!budget.can_retry(), "1 retry over 10 requests at ratio 0.1 should deny further retries");
    }

    #[test]
    fn window_rotation_resets_counters() {
        let clock = Arc::new(ManualClock::new());
        let budget = RetryBudget::with_clock(0.1, 10, Duration::from_millis(100), clock.clone());
        for _ in 0..10 {
            budget.record_request();
        }
        budget.record_retry();
        assert!(!budget.can_retry());

        clock.advance(150);
        assert!(budget.can_retry(), "rotation should have cleared counters");
    }
}
