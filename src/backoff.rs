//! Backoff strategies for retry policies

use std::time::Duration;

/// Backoff strategy for retries
#[derive(Debug, Clone)]
pub enum Backoff {
    /// Fixed delay between retries
    Constant { delay: Duration },
    /// Linearly increasing delay
    Linear { base: Duration },
    /// Exponentially increasing delay with a configurable multiplier and an
    /// optional cap: `delay_i = min(max, base * multiplier^i)` (spec §4.4).
    Exponential { base: Duration, multiplier: f64, max: Option<Duration> },
}

impl Backoff {
    /// Create a constant backoff strategy
    pub fn constant(delay: Duration) -> Self {
        Backoff::Constant { delay }
    }

    /// Create a linear backoff strategy
    pub fn linear(base: Duration) -> Self {
        Backoff::Linear { base }
    }

    /// Create an exponential backoff strategy with the default multiplier (2.0)
    pub fn exponential(base: Duration) -> Self {
        Backoff::Exponential { base, multiplier: 2.0, max: None }
    }

    /// Set the growth multiplier for exponential backoff (default knob is 2.0
    /// per spec §4.4's defaults).
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        if let Backoff::Exponential { multiplier: ref mut m, .. } = self {
            *m = multiplier;
        }
        self
    }

    /// Set a maximum delay for exponential backoff
    pub fn with_max(mut self, max: Duration) -> Self {
        if let Backoff::Exponential { max: ref mut m, .. } = self {
            *m = Some(max);
        }
        self
    }

    /// Calculate the delay for a given attempt number (1-indexed)
    pub fn delay(&self, attempt: usize) -> Duration {
        match self {
            Backoff::Constant { delay } => *delay,
            Backoff::Linear { base } => {
                // Use checked_mul to prevent overflow
                base.checked_mul(attempt as u32)
                    .unwrap_or(Duration::from_secs(u64::MAX))
            }
            Backoff::Exponential { base, multiplier, max } => {
                let exponent = (attempt.saturating_sub(1)) as i32;
                let factor = multiplier.powi(exponent);
                let base_millis = base.as_millis() as f64;
                let exp_millis = base_millis * factor;

                let exp_delay = if exp_millis.is_finite() && exp_millis < u64::MAX as f64 {
                    Duration::from_millis(exp_millis.max(0.0) as u64)
                } else {
                    Duration::from_secs(u64::MAX)
                };

                if let Some(max) = max {
                    exp_delay.min(*max)
                } else {
                    exp_delay
                }
            }
        }
    }
}
