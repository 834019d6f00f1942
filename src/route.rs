//! Route/instance domain types produced by the external router (spec §3).

use std::collections::HashMap;
use std::time::Duration;

/// A routing rule as resolved by the external router.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub service_name: String,
    pub load_balance_strategy: String,
    pub timeout: Duration,
    pub rate_limit: Option<RuleRateLimit>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy)]
pub struct RuleRateLimit {
    pub rate: f64,
    pub burst: u32,
}

/// One resolved backend endpoint.
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: String,
    pub address: String,
    pub port: u16,
    pub scheme: String,
    pub healthy: bool,
    pub metadata: HashMap<String, String>,
}

/// The outcome of routing: the matched rule plus the selected instance.
/// Lifecycle is a single request; carried in the request context.
#[derive(Debug, Clone)]
pub struct RouteResult {
    pub rule: Rule,
    pub instance: Instance,
}

impl RouteResult {
    /// Breaker key precedence per spec §4.3: route, then service, then path.
    pub fn breaker_keys(&self, path: &str) -> [String; 3] {
        [
            format!("route:{}", self.rule.id),
            format!("service:{}", self.rule.service_name),
            format!("path:{}", path),
        ]
    }
}
