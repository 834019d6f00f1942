//! Middleware composition (spec §9): a handler is wrapped by middlewares
//! built at chain-construction time, pre-next logic running in configured
//! order and post-next logic unwinding in reverse.
//!
//! The spec's handler signature `(ctx, request) -> (response, error)` isn't
//! `tower::Service`'s `poll_ready`-based shape, so this crate defines its own
//! minimal trait object + closure composition instead of depending on
//! `tower` generically.

use crate::error::GatewayError;
use crate::request::Request;
use crate::response::Response;
use async_trait::async_trait;
use std::sync::Arc;

/// A request handler: the terminal proxy handler, or any point in a
/// middleware chain.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, request: Request) -> Result<Response, GatewayError>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Response, GatewayError>> + Send,
{
    async fn handle(&self, request: Request) -> Result<Response, GatewayError> {
        self(request).await
    }
}

/// A middleware wraps a handler to produce a new handler.
pub type Middleware = Arc<dyn Fn(Arc<dyn Handler>) -> Arc<dyn Handler> + Send + Sync>;

/// Builds a handler chain from an ordered list of middlewares around a
/// terminal handler (the proxy).
#[derive(Clone, Default)]
pub struct Chain {
    middlewares: Vec<Middleware>,
}

impl Chain {
    pub fn new() -> Self {
        Self { middlewares: Vec::new() }
    }

    pub fn push(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Wraps `terminal` with every registered middleware. The first pushed
    /// middleware is outermost, so its pre-next logic runs first and its
    /// post-next logic runs last (reverse unwind).
    pub fn build(&self, terminal: Arc<dyn Handler>) -> Arc<dyn Handler> {
        self.middlewares.iter().rev().fold(terminal, |next, mw| mw(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Headers;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn req() -> Request {
        Request::new("r1", "GET", "/x", "http://h/x", "127.0.0.1:1", Headers::new(), Bytes::new())
    }

    fn record_middleware(order: Arc<std::sync::Mutex<Vec<&'static str>>>, tag: &'static str) -> Middleware {
        Arc::new(move |next: Arc<dyn Handler>| {
            let order = order.clone();
            let handler: Arc<dyn Handler> = Arc::new(move |request: Request| {
                let order = order.clone();
                let next = next.clone();
                async move {
                    order.lock().unwrap().push(tag);
                    let result = next.handle(request).await;
                    order.lock().unwrap().push(tag);
                    result
                }
            });
            handler
        })
    }

    #[tokio::test]
    async fn middlewares_run_pre_in_order_and_post_in_reverse() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let chain = Chain::new().push(record_middleware(order.clone(), "a")).push(record_middleware(order.clone(), "b"));

        let terminal: Arc<dyn Handler> =
            Arc::new(|_req: Request| async { Ok(Response::new(200, Headers::new(), Bytes::new())) });

        let handler = chain.build(terminal);
        let resp = handler.handle(req()).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "b", "a"]);
    }

    #[tokio::test]
    async fn terminal_handler_runs_without_middlewares() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = counter.clone();
        let terminal: Arc<dyn Handler> = Arc::new(move |_req: Request| {
            let counter = counter2.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Response::new(200, Headers::new(), Bytes::new()))
            }
        });
        let chain = Chain::new();
        let handler = chain.build(terminal);
        let _ = handler.handle(req()).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
