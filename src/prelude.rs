//! Convenient re-exports for building a middleware chain.
pub use crate::{
    by_ip, by_ip_and_path, by_path, circuit_breaker_middleware, oauth2_middleware, rate_limit_middleware,
    retry_middleware, tracking_middleware, transform_middleware, Backoff, Chain, CircuitBreakerConfig,
    CircuitBreakerRegistry, Claims, Clock, Decision, ErrorKind, GatewayConfig, GatewayError, Handler, Headers, Instance,
    Jitter, Middleware, Oauth2MiddlewareConfig, Oauth2Provider, Oauth2ProviderConfig, PerRouteRateLimiter,
    RateLimitMiddlewareConfig, RateLimitStore, Request, Response, RetryBudget, RetryMiddlewareConfig, RetryPolicy,
    RetryPolicyBuilder, RouteResult, RouteTracker, Rule, ServiceRegistry, TokenLocation, TransformMiddlewareConfig,
    TransformRule,
};
