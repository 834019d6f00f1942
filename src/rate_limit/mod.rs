//! Rate limiting: token-bucket semantics over a pluggable storage backend
//! (spec §4.2). The store is the algorithm; the middleware only computes
//! keys and interprets decisions.

mod component;
mod middleware;
mod store;

pub use component::RateLimitComponent;
pub use middleware::{PerRouteRateLimiter, RateLimitMiddlewareConfig, rate_limit_middleware};
pub use store::{DistributedStore, InMemoryStore, RemoteRateLimitTransport};

use crate::error::GatewayError;
use crate::request::Request;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u64,
    pub reset_at_millis: u64,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }
}

/// The rate-limit storage interface (spec §4.2). This is the real algorithm;
/// everything else is bookkeeping around it.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn allow(&self, key: &str, limit: f64, burst: u64, window: Duration) -> Result<Decision, GatewayError> {
        self.allow_n(key, 1, limit, burst, window).await
    }

    async fn allow_n(&self, key: &str, n: u64, limit: f64, burst: u64, window: Duration) -> Result<Decision, GatewayError>;

    async fn reset(&self, key: &str);

    async fn close(&self);
}

/// A function that derives a rate-limit bucket key from a request.
pub type KeyFn = Arc<dyn Fn(&Request) -> String + Send + Sync>;

/// Strip the port from the remote address; fall back to the full string.
pub fn by_ip() -> KeyFn {
    Arc::new(|req: &Request| req.remote_ip().to_string())
}

pub fn by_path() -> KeyFn {
    Arc::new(|req: &Request| req.path().to_string())
}

pub fn by_ip_and_path() -> KeyFn {
    Arc::new(|req: &Request| format!("{}:{}", req.remote_ip(), req.path()))
}

pub fn custom<F>(f: F) -> KeyFn
where
    F: Fn(&Request) -> String + Send + Sync + 'static,
{
    Arc::new(f)
}
