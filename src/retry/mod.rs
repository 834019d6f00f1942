//! Retry engine: exponential backoff + jitter, retry predicate, pluggable
//! sleeper (spec §4.4). Shape follows the crate's existing resilience
//! primitives, fixed to `GatewayError` rather than a generic wrapped error.

mod budget;
mod middleware;

pub use budget::RetryBudget;
pub use middleware::{is_retryable_status, retry_middleware, RetryMiddlewareConfig};

use crate::backoff::Backoff;
use crate::error::GatewayError;
use crate::jitter::Jitter;
use crate::sleeper::{Sleeper, TokioSleeper};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    should_retry: Arc<dyn Fn(&GatewayError) -> bool + Send + Sync>,
    sleeper: Arc<dyn Sleeper>,
    budget: Option<Arc<RetryBudget>>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .finish()
    }
}

impl RetryPolicy {
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// Runs `operation` up to `max_attempts` times total, retrying per
    /// `should_retry` with backoff+jitter between attempts, consulting the
    /// budget (if any) before every attempt beyond the first.
    pub async fn execute<T, Fut, Op>(&self, mut operation: Op) -> Result<T, GatewayError>
    where
        T: Send,
        Fut: Future<Output = Result<T, GatewayError>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        if let Some(budget) = &self.budget {
            budget.record_request();
        }

        for attempt in 0..self.max_attempts {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !(self.should_retry)(&err) {
                        return Err(err);
                    }
                    if attempt + 1 >= self.max_attempts {
                        return Err(err);
                    }
                    if let Some(budget) = &self.budget {
                        if !budget.can_retry() {
                            return Err(err);
                        }
                        budget.record_retry();
                    }

                    let mut delay = self.backoff.delay(attempt + 1);
                    delay = self.jitter.apply(delay);
                    self.sleeper.sleep(delay).await;
                }
            }
        }

        unreachable!("retry loop always returns before exhausting attempts")
    }
}

pub struct RetryPolicyBuilder {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    should_retry: Arc<dyn Fn(&GatewayError) -> bool + Send + Sync>,
    sleeper: Arc<dyn Sleeper>,
    budget: Option<Arc<RetryBudget>>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum BuildError {
    InvalidMaxAttempts(usize),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::InvalidMaxAttempts(n) => write!(f, "max_attempts must be > 0 (got {})", n),
        }
    }
}

impl std::error::Error for BuildError {}

impl RetryPolicyBuilder {
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::exponential(Duration::from_millis(100)).with_max(Duration::from_secs(30)),
            jitter: Jitter::full(),
            should_retry: Arc::new(|e: &GatewayError| e.is_retryable_kind()),
            sleeper: Arc::new(TokioSleeper),
            budget: None,
        }
    }

    pub fn max_attempts(mut self, attempts: usize) -> Result<Self, BuildError> {
        if attempts == 0 {
            return Err(BuildError::InvalidMaxAttempts(attempts));
        }
        self.max_attempts = attempts;
        Ok(self)
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&GatewayError) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn with_budget(mut self, budget: Arc<RetryBudget>) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            jitter: self.jitter,
            should_retry: self.should_retry,
            sleeper: self.sleeper,
            budget: self.budget,
        }
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
