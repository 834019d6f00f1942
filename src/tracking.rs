//! Tracking middleware: feeds external load balancers with in-flight counts,
//! response-time samples, and failure signals (spec §4.7).

use crate::chain::{Handler, Middleware};
use crate::context::ContextKey;
use crate::route::RouteResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

const LEAST_CONNECTIONS: &str = "least-connections";
const RESPONSE_TIME: &str = "response-time";
const ADAPTIVE: &str = "adaptive";

/// Observability counters for one route/instance pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstanceStats {
    pub in_flight: u64,
    pub last_response: Option<Duration>,
    pub ewma_response_millis: Option<f64>,
    pub successes: u64,
    pub failures: u64,
}

impl InstanceStats {
    fn record_response_time(&mut self, elapsed: Duration) {
        self.last_response = Some(elapsed);
        let sample = elapsed.as_secs_f64() * 1000.0;
        self.ewma_response_millis = Some(match self.ewma_response_millis {
            Some(prev) => prev * 0.8 + sample * 0.2,
            None => sample,
        });
    }
}

/// Per-route, per-instance tracker state, created lazily and guarded by a
/// single mutex per spec §4.7.
#[derive(Default)]
pub struct RouteTracker {
    routes: Mutex<HashMap<String, HashMap<String, InstanceStats>>>,
}

impl RouteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_instance<F: FnOnce(&mut InstanceStats)>(&self, route_id: &str, instance_id: &str, f: F) {
        let mut routes = self.routes.lock();
        let instances = routes.entry(route_id.to_string()).or_default();
        let stats = instances.entry(instance_id.to_string()).or_default();
        f(stats);
    }

    pub fn incr_in_flight(&self, route_id: &str, instance_id: &str) {
        self.with_instance(route_id, instance_id, |s| s.in_flight += 1);
    }

    pub fn decr_in_flight(&self, route_id: &str, instance_id: &str) {
        self.with_instance(route_id, instance_id, |s| s.in_flight = s.in_flight.saturating_sub(1));
    }

    pub fn record_response_time(&self, route_id: &str, instance_id: &str, elapsed: Duration) {
        self.with_instance(route_id, instance_id, |s| s.record_response_time(elapsed));
    }

    pub fn record_outcome(&self, route_id: &str, instance_id: &str, failed: bool) {
        self.with_instance(route_id, instance_id, |s| if failed { s.failures += 1 } else { s.successes += 1 });
    }

    pub fn snapshot(&self, route_id: &str, instance_id: &str) -> Option<InstanceStats> {
        self.routes.lock().get(route_id)?.get(instance_id).copied()
    }
}

fn wants_in_flight(strategy: &str) -> bool {
    strategy == LEAST_CONNECTIONS || strategy == ADAPTIVE
}

fn wants_response_time(strategy: &str) -> bool {
    strategy == RESPONSE_TIME || strategy == ADAPTIVE
}

/// Builds the tracking middleware. Requests with no `RouteResult` in context
/// bypass tracking entirely.
pub fn tracking_middleware(tracker: Arc<RouteTracker>) -> Middleware {
    Arc::new(move |next: Arc<dyn Handler>| {
        let tracker = tracker.clone();
        let next = next.clone();
        let handler: Arc<dyn Handler> = Arc::new(move |request: crate::request::Request| {
            let tracker = tracker.clone();
            let next = next.clone();
            async move {
                let route: RouteResult = match request.context().get::<RouteResult>(ContextKey::Route) {
                    Some(r) => r.clone(),
                    None => return next.handle(request).await,
                };
                let strategy = route.rule.load_balance_strategy.as_str();
                let route_id = route.rule.id.clone();
                let instance_id = route.instance.id.clone();

                if wants_in_flight(strategy) {
                    tracker.incr_in_flight(&route_id, &instance_id);
                }
                let start = Instant::now();

                let result = next.handle(request).await;
                let elapsed = start.elapsed();

                if wants_response_time(strategy) {
                    tracker.record_response_time(&route_id, &instance_id, elapsed);
                }
                if wants_in_flight(strategy) {
                    tracker.decr_in_flight(&route_id, &instance_id);
                }
                if strategy == ADAPTIVE {
                    let failed = match &result {
                        Ok(response) => response.is_server_error(),
                        Err(_) => true,
                    };
                    tracker.record_outcome(&route_id, &instance_id, failed);
                }

                result
            }
        });
        handler
    })
}
