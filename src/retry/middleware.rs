//! Retry middleware: per-route/per-service policy selection, status-code
//! based retryability, and budget-guarded attempts (spec §4.4).

use super::RetryPolicy;
use crate::chain::{Handler, Middleware};
use crate::error::GatewayError;
use crate::request::Request;
use crate::response::Response;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// All 5xx except 501, plus 408/429/503 (spec §4.4 middleware layer).
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 503) || ((500..600).contains(&status) && status != 501)
}

pub struct RetryMiddlewareConfig {
    pub default_policy: Arc<RetryPolicy>,
    pub route_policies: HashMap<String, Arc<RetryPolicy>>,
    pub service_policies: HashMap<String, Arc<RetryPolicy>>,
}

impl RetryMiddlewareConfig {
    pub fn new(default_policy: Arc<RetryPolicy>) -> Self {
        Self { default_policy, route_policies: HashMap::new(), service_policies: HashMap::new() }
    }

    pub fn with_route_policy(mut self, route_id: impl Into<String>, policy: Arc<RetryPolicy>) -> Self {
        self.route_policies.insert(route_id.into(), policy);
        self
    }

    pub fn with_service_policy(mut self, service_name: impl Into<String>, policy: Arc<RetryPolicy>) -> Self {
        self.service_policies.insert(service_name.into(), policy);
        self
    }

    /// Route-specific policy, else service-specific, else default.
    fn select(&self, request: &Request) -> Arc<RetryPolicy> {
        if let Some(route) = request.context().route() {
            if let Some(policy) = self.route_policies.get(&route.rule.id) {
                return policy.clone();
            }
            if let Some(policy) = self.service_policies.get(&route.rule.service_name) {
                return policy.clone();
            }
        }
        self.default_policy.clone()
    }
}

pub fn retry_middleware(config: Arc<RetryMiddlewareConfig>) -> Middleware {
    Arc::new(move |next: Arc<dyn Handler>| {
        let config = config.clone();
        let handler: Arc<dyn Handler> = Arc::new(move |request: Request| {
            let config = config.clone();
            let next = next.clone();
            async move {
                let policy = config.select(&request);
                let body = request.body_bytes();
                let last_retryable_response: Arc<Mutex<Option<Response>>> = Arc::new(Mutex::new(None));

                let attempts_before = std::time::Instant::now();
                let result = policy
                    .execute(|| {
                        let next = next.clone();
                        let request = request.with_body(body.clone());
                        let last_retryable_response = last_retryable_response.clone();
                        async move {
                            match next.handle(request).await {
                                Ok(resp) if is_retryable_status(resp.status()) => {
                                    *last_retryable_response.lock() = Some(resp.clone());
                                    Err(GatewayError::internal("retryable response status")
                                        .with_detail("status", resp.status().to_string()))
                                }
                                other => other,
                            }
                        }
                    })
                    .await;

                match result {
                    Ok(resp) => {
                        tracing::debug!(elapsed_ms = attempts_before.elapsed().as_millis() as u64, "retry: succeeded");
                        Ok(resp)
                    }
                    Err(err) => {
                        if let Some(resp) = last_retryable_response.lock().take() {
                            tracing::warn!(status = resp.status(), "retry exhausted, returning last response");
                            Ok(resp)
                        } else {
                            tracing::warn!(error = %err, "retry exhausted");
                            Err(err)
                        }
                    }
                }
            }
        });
        handler
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::Backoff;
    use crate::jitter::Jitter;
    use crate::request::Headers;
    use crate::sleeper::InstantSleeper;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn req() -> Request {
        Request::new("r1", "GET", "/x", "http://h/x", "127.0.0.1:1", Headers::new(), Bytes::new())
    }

    fn fast_policy(attempts: usize) -> Arc<RetryPolicy> {
        Arc::new(
            RetryPolicy::builder()
                .max_attempts(attempts)
                .expect("ok")
                .backoff(Backoff::constant(Duration::from_millis(1)))
                .with_jitter(Jitter::None)
                .with_sleeper(InstantSleeper)
                .build(),
        )
    }

    #[tokio::test]
    async fn retries_on_5xx_then_succeeds() {
        let config = Arc::new(RetryMiddlewareConfig::new(fast_policy(3)));
        let mw = retry_middleware(config);

        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = counter.clone();
        let flaky: Arc<dyn Handler> = Arc::new(move |_req: Request| {
            let counter = counter2.clone();
            async move {
                let attempt = counter.fetch_add(1, Ordering::SeqCst);
                let status = if attempt < 2 { 503 } else { 200 };
                Ok(Response::new(status, Headers::new(), Bytes::new()))
            }
        });

        let handler = mw(flaky);
        let resp = handler.handle(req()).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_response_not_hard_error() {
        let config = Arc::new(RetryMiddlewareConfig::new(fast_policy(2)));
        let mw = retry_middleware(config);

        let always_503: Arc<dyn Handler> = Arc::new(|_req: Request| async { Ok(Response::new(503, Headers::new(), Bytes::new())) });
        let handler = mw(always_503);
        let resp = handler.handle(req()).await.unwrap();
        assert_eq!(resp.status(), 503);
    }

    #[tokio::test]
    async fn non_retryable_status_is_returned_immediately() {
        let config = Arc::new(RetryMiddlewareConfig::new(fast_policy(5)));
        let mw = retry_middleware(config);

        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = counter.clone();
        let not_found: Arc<dyn Handler> = Arc::new(move |_req: Request| {
            let counter = counter2.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Response::new(404, Headers::new(), Bytes::new()))
            }
        });
        let handler = mw(not_found);
        let resp = handler.handle(req()).await.unwrap();
        assert_eq!(resp.status(), 404);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn is_retryable_status_matches_spec_table() {
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(599));
        assert!(!is_retryable_status(501));
        assert!(is_retryable_status(408));
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(200));
        assert!(!is_retryable_status(404));
    }
}
