//! Rate-limit middleware: per-route configuration selection, key
//! derivation, and decision-to-response mapping (spec §4.2).

use super::{KeyFn, RateLimitStore};
use crate::chain::{Handler, Middleware};
use crate::error::{ErrorKind, GatewayError};
use crate::request::Request;
use std::sync::Arc;
use std::time::Duration;

/// Maps a storage-layer error (one that is not itself a rate-limit denial —
/// stores signal denial via `Decision::allowed`, never `Err`) onto
/// `ErrorKind::RateLimit` so callers can't mistake a backend outage for some
/// unrelated internal failure (spec §4.2).
fn wrap_store_error(err: GatewayError) -> GatewayError {
    let message = err.message.clone();
    GatewayError::new(ErrorKind::RateLimit, message).with_cause(err)
}

/// One rate-limit rule: requests/sec, burst size, and the key function that
/// picks the bucket.
pub struct RateLimitMiddlewareConfig {
    pub store: Arc<dyn RateLimitStore>,
    pub key_fn: KeyFn,
    pub limit: f64,
    pub burst: u64,
    pub window: Duration,
}

impl RateLimitMiddlewareConfig {
    pub fn new(store: Arc<dyn RateLimitStore>, key_fn: KeyFn, limit: f64, burst: u64, window: Duration) -> Self {
        Self { store, key_fn, limit, burst, window }
    }
}

/// A single, unconditional rate limit middleware.
pub fn rate_limit_middleware(config: Arc<RateLimitMiddlewareConfig>) -> Middleware {
    Arc::new(move |next: Arc<dyn Handler>| {
        let config = config.clone();
        let next = next.clone();
        let handler: Arc<dyn Handler> = Arc::new(move |request: Request| {
            let config = config.clone();
            let next = next.clone();
            async move {
                let key = (config.key_fn)(&request);
                let decision = config.store.allow(&key, config.limit, config.burst, config.window).await.map_err(wrap_store_error)?;
                if !decision.is_allowed() {
                    tracing::debug!(key, remaining = decision.remaining, "rate limit exceeded");
                    return Err(GatewayError::rate_limited(key));
                }
                next.handle(request).await
            }
        });
        handler
    })
}

/// A glob-style route pattern: either an exact path or a `prefix/*` wildcard.
#[derive(Debug, Clone)]
pub struct Pattern(String);

impl Pattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn matches(&self, path: &str) -> bool {
        match self.0.strip_suffix('*') {
            Some(prefix) => path.starts_with(prefix),
            None => self.0 == path,
        }
    }
}

/// Per-route rate limiting: the first matching pattern (in registration
/// order) applies; unmatched requests bypass rate limiting entirely
/// (spec §4.2).
pub struct PerRouteRateLimiter {
    rules: Vec<(Pattern, Arc<RateLimitMiddlewareConfig>)>,
}

impl PerRouteRateLimiter {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule(mut self, pattern: impl Into<String>, config: Arc<RateLimitMiddlewareConfig>) -> Self {
        self.rules.push((Pattern::new(pattern), config));
        self
    }

    fn select(&self, path: &str) -> Option<Arc<RateLimitMiddlewareConfig>> {
        self.rules.iter().find(|(pattern, _)| pattern.matches(path)).map(|(_, config)| config.clone())
    }

    pub fn middleware(self: Arc<Self>) -> Middleware {
        Arc::new(move |next: Arc<dyn Handler>| {
            let router = self.clone();
            let next = next.clone();
            let handler: Arc<dyn Handler> = Arc::new(move |request: Request| {
                let router = router.clone();
                let next = next.clone();
                async move {
                    let Some(config) = router.select(request.path()) else {
                        return next.handle(request).await;
                    };
                    let key = (config.key_fn)(&request);
                    let decision = config.store.allow(&key, config.limit, config.burst, config.window).await.map_err(wrap_store_error)?;
                    if !decision.is_allowed() {
                        tracing::debug!(key, path = request.path(), "rate limit exceeded");
                        return Err(GatewayError::rate_limited(key));
                    }
                    next.handle(request).await
                }
            });
            handler
        })
    }
}

impl Default for PerRouteRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
