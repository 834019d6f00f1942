#![forbid(unsafe_code)]

//! # gateway-resilience
//!
//! Reliability middleware for an API gateway: rate limiting, circuit
//! breaking, retries with a shared budget, OAuth2/OIDC token validation,
//! request/response transformation, per-instance load-balancer tracking,
//! and service discovery (static tables, raw Docker, Docker Compose).
//!
//! Every middleware has the same [`Handler`] / [`Middleware`] shape: a
//! function from the next handler in the chain to a new handler wrapping
//! it. [`Chain`] composes a list of them around a terminal handler, first
//! pushed outermost.
//!
//! ## Quick Start
//!
//! ```rust
//! use gateway_resilience::{
//!     circuit_breaker_middleware, Chain, CircuitBreakerConfig, CircuitBreakerRegistry, Handler, Headers, Request, Response,
//! };
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let terminal: Arc<dyn Handler> =
//!     Arc::new(|req: Request| async move { Ok(Response::new(200, Headers::new(), req.body_bytes())) });
//!
//! let breakers = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default()));
//! let chain = Chain::new().push(circuit_breaker_middleware(breakers));
//! let handler = chain.build(terminal);
//!
//! let request = Request::new("r1", "GET", "/", "http://gw/", "10.0.0.1:1", Headers::new(), Bytes::new());
//! let response = handler.handle(request).await.unwrap();
//! assert_eq!(response.status(), 200);
//! # }
//! ```

mod backoff;
mod chain;
mod circuit_breaker;
mod clock;
mod config;
mod context;
mod discovery;
mod error;
mod factory;
mod jitter;
mod oauth2;
mod rate_limit;
mod request;
mod response;
mod retry;
mod route;
mod sleeper;
mod tracking;
mod transform;

pub use backoff::Backoff;
pub use chain::{Chain, Handler, Middleware};
pub use circuit_breaker::{
    circuit_breaker_middleware, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState,
};
pub use clock::{Clock, MonotonicClock};
pub use config::{
    CircuitBreakerRuleConfig, CircuitBreakerTopConfig, GatewayConfig, JitterKind, Oauth2Config, Oauth2ProviderWireConfig,
    PathTransformConfig, PerRouteRateLimitConfig, RateLimitConfig, RateLimitRuleConfig, RegistryConfig, RegistryType,
    RetryRuleConfig, RetryTopConfig, StoreBackend, TokenExtractionConfig, TransformConfig, TransformOperationConfig,
};
pub use context::{ContextKey, RequestContext};
pub use discovery::{
    DockerComposeRegistry, DockerComposeRegistryConfig, DockerRegistry, DockerRegistryConfig, ServiceRegistry, StaticRegistry,
};
pub use error::{ErrorKind, GatewayError};
pub use factory::{build, Component, ComponentHealth, ComponentRegistry, LifecycleComponent, RawConfig};
pub use jitter::Jitter;
pub use oauth2::{
    oauth2_middleware, Claims, JwksCache, Oauth2MiddlewareConfig, Oauth2Provider, Oauth2ProviderConfig, TokenLocation,
    TokenResponse,
};
pub use rate_limit::{
    by_ip, by_ip_and_path, by_path, custom, rate_limit_middleware, Decision, DistributedStore, InMemoryStore, KeyFn,
    PerRouteRateLimiter, RateLimitComponent, RateLimitMiddlewareConfig, RateLimitStore, RemoteRateLimitTransport,
};
pub use request::{Headers, Request};
pub use response::Response;
pub use retry::{
    is_retryable_status, retry_middleware, BuildError, RetryBudget, RetryMiddlewareConfig, RetryPolicy, RetryPolicyBuilder,
};
pub use route::{Instance, Rule, RuleRateLimit, RouteResult};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use tracking::{tracking_middleware, InstanceStats, RouteTracker};
pub use transform::{
    transform_middleware, HeaderOp, HeaderTransform, JsonOp, JsonTransform, Pattern, TransformCondition,
    TransformMiddlewareConfig, TransformRule,
};

pub mod prelude;
