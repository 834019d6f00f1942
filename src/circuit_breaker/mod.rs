//! Circuit breaker: three-state machine with absolute and ratio-based
//! tripping, half-open admission control, and periodic counter rotation
//! (spec §4.3).

mod middleware;
mod registry;

pub use middleware::circuit_breaker_middleware;
pub use registry::CircuitBreakerRegistry;

use crate::clock::{Clock, MonotonicClock};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub max_failures: u64,
    pub failure_threshold: f64,
    pub timeout: Duration,
    pub max_requests: u32,
    pub interval: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            failure_threshold: 0.6,
            timeout: Duration::from_secs(30),
            max_requests: 1,
            interval: Duration::from_secs(60),
        }
    }
}

struct Inner {
    state: CircuitState,
    failures: u64,
    successes: u64,
    half_open_admissions: u32,
    half_open_successes: u32,
    last_state_change_millis: u64,
}

/// A single keyed circuit breaker.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    generation: AtomicU64,
    clock: Arc<dyn Clock>,
    on_state_change: Option<Arc<dyn Fn(CircuitState, CircuitState) + Send + Sync>>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker").field("config", &self.config).finish()
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicClock::default()))
    }

    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_millis();
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                half_open_admissions: 0,
                half_open_successes: 0,
                last_state_change_millis: now,
            }),
            generation: AtomicU64::new(0),
            clock,
            on_state_change: None,
        }
    }

    pub fn on_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(f));
        self
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn should_open(&self, failures: u64, successes: u64) -> bool {
        if failures >= self.config.max_failures {
            return true;
        }
        let total = failures + successes;
        if total == 0 {
            return false;
        }
        (failures as f64) / (total as f64) >= self.config.failure_threshold
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        inner.last_state_change_millis = self.clock.now_millis();
        inner.failures = 0;
        inner.successes = 0;
        inner.half_open_admissions = 0;
        inner.half_open_successes = 0;
        self.generation.fetch_add(1, Ordering::AcqRel);

        if let Some(hook) = self.on_state_change.clone() {
            tokio::spawn(async move {
                hook(from, to);
            });
        }
    }

    /// Admission check. Returns `true` if the call may proceed.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = self.clock.now_millis().saturating_sub(inner.last_state_change_millis);
                if elapsed >= self.config.timeout.as_millis() as u64 {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.half_open_admissions += 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_admissions < self.config.max_requests {
                    inner.half_open_admissions += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.successes += 1;
            }
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.max_requests {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failures += 1;
                if self.should_open(inner.failures, inner.successes) {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Clears failure/success counters if `interval` has elapsed since the
    /// last state change, while staying closed. Intended to be driven by a
    /// background ticker (spec §4.3 "counter rotation").
    pub fn rotate_if_due(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            return;
        }
        let elapsed = self.clock.now_millis().saturating_sub(inner.last_state_change_millis);
        if elapsed >= self.config.interval.as_millis() as u64 {
            inner.failures = 0;
            inner.successes = 0;
            inner.last_state_change_millis = self.clock.now_millis();
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
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

    fn breaker(config: CircuitBreakerConfig) -> (CircuitBreaker, ManualClock) {
        let clock = ManualClock::new();
        let breaker = CircuitBreaker::with_clock(config, Arc::new(clock.clone()));
        (breaker, clock)
    }

    #[test]
    fn opens_on_absolute_threshold() {
        let (b, _clock) = breaker(CircuitBreakerConfig {
            max_failures: 3,
            failure_threshold: 1.0,
            ..Default::default()
        });
        for _ in 0..2 {
            assert!(b.allow());
            b.record_failure();
        }
        assert_eq!(b.state(), CircuitState::Closed);
        assert!(b.allow());
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        assert!(!b.allow());
    }

    #[test]
    fn opens_on_ratio_threshold() {
        let (b, _clock) = breaker(CircuitBreakerConfig {
            max_failures: 100,
            failure_threshold: 0.5,
            ..Default::default()
        });
        for _ in 0..4 {
            b.record_success();
        }
        for _ in 0..3 {
            b.record_failure();
        }
        assert_eq!(b.state(), CircuitState::Closed);
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[test]
    fn half_open_closes_on_success_and_reopens_on_failure() {
        let (b, clock) = breaker(CircuitBreakerConfig {
            max_failures: 1,
            failure_threshold: 1.0,
            timeout: Duration::from_millis(100),
            max_requests: 1,
            ..Default::default()
        });
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
        assert!(!b.allow());

        clock.advance(150);
        assert!(b.allow());
        assert_eq!(b.state(), CircuitState::HalfOpen);
        b.record_success();
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let (b, clock) = breaker(CircuitBreakerConfig {
            max_failures: 1,
            failure_threshold: 1.0,
            timeout: Duration::from_millis(100),
            max_requests: 1,
            ..Default::default()
        });
        b.record_failure();
        clock.advance(150);
        assert!(b.allow());
        b.record_failure();
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[test]
    fn half_open_limits_admissions() {
        let (b, clock) = breaker(CircuitBreakerConfig {
            max_failures: 1,
            failure_threshold: 1.0,
            timeout: Duration::from_millis(100),
            max_requests: 1,
            ..Default::default()
        });
        b.record_failure();
        clock.advance(150);
        assert!(b.allow());
        assert!(!b.allow(), "second concurrent half-open admission should be denied");
    }

    #[test]
    fn rotation_clears_counters_while_closed() {
        let (b, clock) = breaker(CircuitBreakerConfig {
            max_failures: 100,
            failure_threshold: 1.0,
            interval: Duration::from_millis(100),
            ..Default::default()
        });
        b.record_failure();
        let gen_before = b.generation();
        clock.advance(150);
        b.rotate_if_due();
        assert!(b.generation() > gen_before);
    }
}
