use bytes::Bytes;
use gateway_resilience::{
    by_path, rate_limit_middleware, Chain, Handler, Headers, InMemoryStore, RateLimitMiddlewareConfig,
    RateLimitStore, Request, Response,
};
use std::sync::Arc;
use std::time::Duration;

fn req() -> Request {
    Request::new("r1", "GET", "/limited/orders", "http://gw/limited/orders", "10.0.0.1:1", Headers::new(), Bytes::new())
}

fn terminal() -> Arc<dyn Handler> {
    Arc::new(|_req: Request| async { Ok(Response::new(200, Headers::new(), Bytes::new())) })
}

#[tokio::test]
async fn ten_requests_admitted_eleventh_denied_then_refills_after_sleep() {
    let store: Arc<dyn RateLimitStore> = Arc::new(InMemoryStore::new(1000));
    let config = Arc::new(RateLimitMiddlewareConfig::new(store, by_path(), 5.0, 10, Duration::from_secs(1)));
    let chain = Chain::new().push(rate_limit_middleware(config));
    let handler = chain.build(terminal());

    for i in 0..10 {
        let resp = handler.handle(req()).await.unwrap();
        assert_eq!(resp.status(), 200, "request {} should be admitted", i);
    }

    let err = handler.handle(req()).await.unwrap_err();
    assert_eq!(err.kind, gateway_resilience::ErrorKind::RateLimit);

    tokio::time::sleep(Duration::from_millis(250)).await;

    let resp = handler.handle(req()).await.unwrap();
    assert_eq!(resp.status(), 200, "bucket should have refilled enough for one more admission");
}
