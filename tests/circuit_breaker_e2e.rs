use bytes::Bytes;
use gateway_resilience::{
    circuit_breaker_middleware, Chain, CircuitBreakerConfig, CircuitBreakerRegistry, ErrorKind, GatewayError, Handler,
    Headers, Request, Response,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn req() -> Request {
    Request::new("r1", "GET", "/x", "http://gw/x", "10.0.0.1:1", Headers::new(), Bytes::new())
}

#[tokio::test]
async fn breaker_trips_then_recovers_through_half_open() {
    let registry = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig {
        max_failures: 2,
        failure_threshold: 1.0,
        timeout: Duration::from_millis(100),
        max_requests: 1,
        interval: Duration::from_secs(60),
    }));
    let chain = Chain::new().push(circuit_breaker_middleware(registry));

    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = calls.clone();
    let flaky: Arc<dyn Handler> = Arc::new(move |_req: Request| {
        let calls = calls2.clone();
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(GatewayError::internal("upstream failed"))
            } else {
                Ok(Response::new(200, Headers::new(), Bytes::new()))
            }
        }
    });
    let handler = chain.build(flaky);

    assert!(handler.handle(req()).await.is_err(), "first call fails");
    assert!(handler.handle(req()).await.is_err(), "second call fails and trips the breaker");

    let blocked = handler.handle(req()).await.unwrap_err();
    assert_eq!(blocked.kind, ErrorKind::Unavailable, "third call should be blocked by the open breaker");
    assert_eq!(calls.load(Ordering::SeqCst), 2, "blocked call must not reach the handler");

    tokio::time::sleep(Duration::from_millis(150)).await;

    let recovered = handler.handle(req()).await.unwrap();
    assert_eq!(recovered.status(), 200, "half-open probe should be admitted and succeed");

    let after = handler.handle(req()).await.unwrap();
    assert_eq!(after.status(), 200, "breaker should stay closed after the successful probe");
}
