//! E2E-4: Auth ∘ RateLimit ∘ CircuitBreaker ∘ Retry ∘ Transform ∘ proxy.
//!
//! Recovery (panic-to-error conversion) and request logging sit outside this
//! crate's scope (consumer responsibilities per the component boundaries);
//! the rest of the chain is exercised here in its documented order.

use bytes::Bytes;
use gateway_resilience::{
    circuit_breaker_middleware, oauth2_middleware, rate_limit_middleware, retry_middleware, transform_middleware,
    by_path, Chain, CircuitBreakerConfig, CircuitBreakerRegistry, ErrorKind, Handler, HeaderTransform, Headers,
    InMemoryStore, Oauth2MiddlewareConfig, Oauth2Provider, Oauth2ProviderConfig, RateLimitMiddlewareConfig,
    RateLimitStore, Request, RetryMiddlewareConfig, RetryPolicy, Response, TransformMiddlewareConfig, TransformRule,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header as JwtHeader};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Serialize)]
struct TestClaims {
    sub: String,
    exp: i64,
}

fn token() -> String {
    let claims = TestClaims { sub: "user-1".to_string(), exp: chrono::Utc::now().timestamp() + 3600 };
    encode(&JwtHeader::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(b"shared-secret")).unwrap()
}

fn build_handler(store: Arc<InMemoryStore>) -> Arc<dyn Handler> {
    let provider = Arc::new(Oauth2Provider::new(Oauth2ProviderConfig {
        client_secret: Some("shared-secret".to_string()),
        ..Default::default()
    }));
    let auth = oauth2_middleware(Arc::new(Oauth2MiddlewareConfig::new(vec![provider])));

    let rate_limit_store: Arc<dyn RateLimitStore> = store;
    let rate_limit = rate_limit_middleware(Arc::new(RateLimitMiddlewareConfig::new(
        rate_limit_store,
        by_path(),
        100.0,
        100,
        Duration::from_secs(1),
    )));

    let breaker = circuit_breaker_middleware(Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default())));

    let retry = retry_middleware(Arc::new(RetryMiddlewareConfig::new(Arc::new(
        RetryPolicy::builder().max_attempts(1).expect("max_attempts > 0").build(),
    ))));

    let transform_rule = TransformRule::new().with_headers(HeaderTransform::new().add("x-transformed", "1"));
    let transform = transform_middleware(Arc::new(TransformMiddlewareConfig::new().with_global_response(transform_rule)));

    let proxy: Arc<dyn Handler> = Arc::new(|req: Request| async move { Ok(Response::new(200, Headers::new(), req.body_bytes())) });

    Chain::new().push(auth).push(rate_limit).push(breaker).push(retry).push(transform).build(proxy)
}

fn req(headers: Headers) -> Request {
    Request::new("r1", "GET", "/orders", "http://gw/orders", "10.0.0.1:1", headers, Bytes::from_static(b"body"))
}

#[tokio::test]
async fn valid_token_flows_through_and_response_carries_transform() {
    let store = Arc::new(InMemoryStore::new(100));
    let handler = build_handler(store);

    let mut headers = Headers::new();
    headers.insert("authorization", format!("Bearer {}", token()));
    let resp = handler.handle(req(headers)).await.unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("x-transformed"), Some("1"));
}

#[tokio::test]
async fn missing_token_is_rejected_before_rate_limit_bookkeeping() {
    let store = Arc::new(InMemoryStore::new(100));
    let handler = build_handler(store.clone());

    let err = handler.handle(req(Headers::new())).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unauthorized);
    assert!(store.is_empty(), "auth rejection must short-circuit before the rate limiter ever sees the request");
}
