use bytes::Bytes;
use gateway_resilience::{
    retry_middleware, Backoff, Chain, GatewayError, Handler, Headers, Jitter, Request, Response, RetryMiddlewareConfig,
    RetryPolicy,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn req() -> Request {
    Request::new("r1", "GET", "/x", "http://gw/x", "10.0.0.1:1", Headers::new(), Bytes::new())
}

#[tokio::test]
async fn retries_transient_failures_then_succeeds_with_backoff_delay() {
    let initial_delay = Duration::from_millis(30);
    let policy = Arc::new(
        RetryPolicy::builder()
            .max_attempts(3)
            .expect("max_attempts > 0")
            .backoff(Backoff::exponential(initial_delay))
            .with_jitter(Jitter::None)
            .build(),
    );
    let config = Arc::new(RetryMiddlewareConfig::new(policy));
    let chain = Chain::new().push(retry_middleware(config));

    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = calls.clone();
    let flaky: Arc<dyn Handler> = Arc::new(move |_req: Request| {
        let calls = calls2.clone();
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(GatewayError::internal("transient upstream failure"))
            } else {
                Ok(Response::new(200, Headers::new(), Bytes::new()))
            }
        }
    });
    let handler = chain.build(flaky);

    let start = Instant::now();
    let resp = handler.handle(req()).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(resp.status(), 200);
    assert_eq!(calls.load(Ordering::SeqCst), 3, "exactly 3 upstream invocations");
    assert!(
        elapsed >= initial_delay + initial_delay * 2,
        "elapsed {:?} should cover the initial delay plus its doubling",
        elapsed
    );
}
