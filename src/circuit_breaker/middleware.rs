//! Circuit breaker middleware: derives a breaker key from context, denies
//! calls while the breaker is open, and classifies the outcome afterward
//! (spec §4.3 middleware contract).

use super::CircuitBreakerRegistry;
use crate::chain::{Handler, Middleware};
use crate::error::{ErrorKind, GatewayError};
use crate::request::Request;
use std::sync::Arc;

fn breaker_key(request: &Request) -> String {
    if let Some(route) = request.context().route() {
        let keys = route.breaker_keys(request.path());
        return keys[0].clone();
    }
    format!("path:{}", request.path())
}

/// Classifies whether an error should count as an instance failure. Client
/// faults are excluded so they never penalize the backend (spec §4.3.1).
fn counts_as_failure(err: &GatewayError) -> bool {
    !err.kind.is_client_fault()
}

pub fn circuit_breaker_middleware(registry: Arc<CircuitBreakerRegistry>) -> Middleware {
    Arc::new(move |next: Arc<dyn Handler>| {
        let registry = registry.clone();
        let handler: Arc<dyn Handler> = Arc::new(move |request: Request| {
            let registry = registry.clone();
            let next = next.clone();
            async move {
                let key = breaker_key(&request);
                let breaker = registry.get_or_create(&key);

                if !breaker.allow() {
                    return Err(GatewayError::circuit_open(key));
                }

                let result = next.handle(request).await;
                match &result {
                    Ok(resp) if resp.is_server_error() => breaker.record_failure(),
                    Ok(_) => breaker.record_success(),
                    Err(e) if counts_as_failure(e) => breaker.record_failure(),
                    Err(_) => breaker.record_success(),
                }
                result
            }
        });
        handler
    })
}
