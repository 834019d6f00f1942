//! Wire configuration schema (spec §6): serde-deserializable mirrors of the
//! runtime types used to construct each middleware from a config file.

use crate::backoff::Backoff;
use crate::chain::{Chain, Handler, Middleware};
use crate::circuit_breaker::{circuit_breaker_middleware, CircuitBreakerConfig, CircuitBreakerRegistry};
use crate::error::GatewayError;
use crate::factory::{build as build_component, RawConfig};
use crate::jitter::Jitter;
use crate::oauth2::Oauth2ProviderConfig;
use crate::rate_limit::{RateLimitComponent, RateLimitStore};
use crate::retry::{retry_middleware, RetryMiddlewareConfig, RetryPolicy};
use crate::transform::{transform_middleware, HeaderTransform, JsonTransform, TransformMiddlewareConfig, TransformRule};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRuleConfig {
    pub rate: f64,
    pub burst: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerRouteRateLimitConfig {
    pub path: String,
    pub rate: f64,
    pub burst: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    Memory,
    Distributed,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    #[serde(default)]
    pub enabled: bool,
    pub default: Option<RateLimitRuleConfig>,
    #[serde(default)]
    pub per_route: Vec<PerRouteRateLimitConfig>,
    pub store_backend: Option<StoreBackend>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerRuleConfig {
    pub max_failures: u64,
    pub failure_threshold: f64,
    pub timeout_sec: u64,
    pub max_requests: u32,
    pub interval_sec: u64,
}

impl From<CircuitBreakerRuleConfig> for CircuitBreakerConfig {
    fn from(rule: CircuitBreakerRuleConfig) -> Self {
        CircuitBreakerConfig {
            max_failures: rule.max_failures,
            failure_threshold: rule.failure_threshold,
            timeout: Duration::from_secs(rule.timeout_sec),
            max_requests: rule.max_requests,
            interval: Duration::from_secs(rule.interval_sec),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerTopConfig {
    #[serde(default)]
    pub enabled: bool,
    pub default: Option<CircuitBreakerRuleConfig>,
    #[serde(default)]
    pub routes: HashMap<String, CircuitBreakerRuleConfig>,
    #[serde(default)]
    pub services: HashMap<String, CircuitBreakerRuleConfig>,
}

fn default_multiplier() -> f64 {
    2.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterKind {
    None,
    #[default]
    Full,
    Equal,
}

impl From<JitterKind> for Jitter {
    fn from(kind: JitterKind) -> Self {
        match kind {
            JitterKind::None => Jitter::None,
            JitterKind::Full => Jitter::full(),
            JitterKind::Equal => Jitter::equal(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryRuleConfig {
    pub max_attempts: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default)]
    pub jitter: JitterKind,
    pub budget_ratio: Option<f64>,
}

impl RetryRuleConfig {
    /// Builds the exponential backoff this rule describes, capped at
    /// `max_delay_ms`.
    pub fn backoff(&self) -> Backoff {
        Backoff::exponential(Duration::from_millis(self.initial_delay_ms))
            .with_multiplier(self.multiplier)
            .with_max(Duration::from_millis(self.max_delay_ms))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryTopConfig {
    #[serde(default)]
    pub enabled: bool,
    pub default: Option<RetryRuleConfig>,
    #[serde(default)]
    pub routes: HashMap<String, RetryRuleConfig>,
    #[serde(default)]
    pub services: HashMap<String, RetryRuleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Oauth2ProviderWireConfig {
    pub name: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub authorization_url: Option<String>,
    pub token_url: Option<String>,
    pub user_info_url: Option<String>,
    pub jwks_endpoint: Option<String>,
    pub issuer_url: Option<String>,
    pub discovery_url: Option<String>,
    #[serde(default)]
    pub use_discovery: bool,
    #[serde(default = "default_true")]
    pub validate_issuer: bool,
    #[serde(default)]
    pub validate_audience: bool,
    #[serde(default)]
    pub audience: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub claims_mapping: HashMap<String, String>,
}

impl From<Oauth2ProviderWireConfig> for Oauth2ProviderConfig {
    fn from(wire: Oauth2ProviderWireConfig) -> Self {
        Oauth2ProviderConfig {
            issuer_url: wire.issuer_url.or(wire.discovery_url),
            use_discovery: wire.use_discovery,
            client_id: wire.client_id.unwrap_or_default(),
            client_secret: wire.client_secret,
            validate_issuer: wire.validate_issuer,
            validate_audience: wire.validate_audience,
            allowed_audiences: wire.audience,
            claims_mapping: wire.claims_mapping.into_iter().collect(),
            authorization_endpoint: wire.authorization_url,
            token_endpoint: wire.token_url,
            userinfo_endpoint: wire.user_info_url,
            jwks_uri: wire.jwks_endpoint,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenExtractionConfig {
    pub token_header: Option<String>,
    pub token_query: Option<String>,
    pub token_cookie: Option<String>,
    #[serde(default = "default_bearer_prefix")]
    pub bearer_prefix: String,
}

fn default_bearer_prefix() -> String {
    "Bearer ".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Oauth2Config {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub providers: Vec<Oauth2ProviderWireConfig>,
    #[serde(default)]
    pub token_extraction: TokenExtractionConfig,
    #[serde(default)]
    pub required_scopes: Vec<String>,
    #[serde(default)]
    pub required_audience: Vec<String>,
    pub claims_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum TransformOperationConfig {
    Add { path: String, value: serde_json::Value },
    Remove { path: String },
    Rename { from: String, to: String },
    Modify { path: String, value: serde_json::Value },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathTransformConfig {
    pub path: String,
    #[serde(default)]
    pub header_ops: Vec<TransformOperationConfig>,
    #[serde(default)]
    pub body_ops: Vec<TransformOperationConfig>,
}

impl PathTransformConfig {
    /// Builds the runtime transform rule this entry describes. A `Modify`
    /// header op has no representation in this wire schema (it needs a
    /// regex, not a value) and is skipped with a warning.
    pub fn to_rule(&self) -> TransformRule {
        let mut headers = HeaderTransform::new();
        for op in &self.header_ops {
            headers = match op {
                TransformOperationConfig::Add { path, value } => headers.add(path.clone(), json_to_string(value)),
                TransformOperationConfig::Remove { path } => headers.remove(path.clone()),
                TransformOperationConfig::Rename { from, to } => headers.rename(from.clone(), to.clone()),
                TransformOperationConfig::Modify { path, .. } => {
                    tracing::warn!(path, "header modify ops require a regex and cannot be expressed in config; skipping");
                    headers
                }
            };
        }

        let mut body = JsonTransform::new();
        for op in &self.body_ops {
            body = match op {
                TransformOperationConfig::Add { path, value } => body.add(path.clone(), value.clone()),
                TransformOperationConfig::Remove { path } => body.remove(path.clone()),
                TransformOperationConfig::Rename { from, to } => body.rename(from.clone(), to.clone()),
                TransformOperationConfig::Modify { path, value } => body.modify(path.clone(), value.clone()),
            };
        }

        TransformRule::new().with_headers(headers).with_body(body)
    }
}

fn json_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub request: Vec<PathTransformConfig>,
    #[serde(default)]
    pub response: Vec<PathTransformConfig>,
    pub global_request: Option<PathTransformConfig>,
    pub global_response: Option<PathTransformConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistryType {
    Static,
    Docker,
    DockerCompose,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConfig {
    #[serde(rename = "type")]
    pub registry_type: Option<RegistryType>,
    pub project_name: Option<String>,
    pub label_prefix: Option<String>,
    pub refresh_interval_sec: Option<u64>,
}

/// The top-level gateway configuration, as deserialized from a config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerTopConfig,
    #[serde(default)]
    pub retry: RetryTopConfig,
    #[serde(default)]
    pub oauth2: Oauth2Config,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

impl GatewayConfig {
    /// Constructs the runtime middleware chain this configuration describes,
    /// wiring each enabled section into real middleware (spec §6) instead of
    /// leaving the wire schema inert data. Order is fixed: oauth2, circuit
    /// breaker, retry, rate limit, transform — outermost first.
    ///
    /// OAuth2 provider construction needs async discovery/JWKS setup this
    /// method has no event loop access to drive, so an already-built OAuth2
    /// middleware is accepted as a parameter rather than assembled here; the
    /// rate limiter is built directly through [`crate::factory::build`] so
    /// the component framework has at least one real, non-test implementor.
    pub fn build_chain(
        &self,
        rate_limit_store: Arc<dyn RateLimitStore>,
        breakers: Arc<CircuitBreakerRegistry>,
        oauth2: Option<Middleware>,
        terminal: Arc<dyn Handler>,
    ) -> Result<Arc<dyn Handler>, GatewayError> {
        let mut chain = Chain::new();

        if self.oauth2.enabled {
            if let Some(mw) = oauth2 {
                chain = chain.push(mw);
            }
        }

        if self.circuit_breaker.enabled {
            chain = chain.push(circuit_breaker_middleware(breakers));
        }

        if self.retry.enabled {
            if let Some(rule) = &self.retry.default {
                let policy = RetryPolicy::builder()
                    .max_attempts(rule.max_attempts)
                    .map_err(|e| GatewayError::bad_request(e.to_string()))?
                    .backoff(rule.backoff())
                    .with_jitter(rule.jitter.into())
                    .build();
                chain = chain.push(retry_middleware(Arc::new(RetryMiddlewareConfig::new(Arc::new(policy)))));
            }
        }

        if self.rate_limit.enabled {
            if let Some(rule) = self.rate_limit.default {
                let mut component = RateLimitComponent::new(rate_limit_store);
                build_component(&mut component, &RawConfig::typed(rule))?;
                if let Some(mw) = component.middleware() {
                    chain = chain.push(mw);
                }
            }
        }

        if self.transform.enabled {
            let mut transform_config = TransformMiddlewareConfig::new();
            for entry in &self.transform.request {
                transform_config = transform_config.with_request_rule(entry.path.clone(), entry.to_rule());
            }
            for entry in &self.transform.response {
                transform_config = transform_config.with_response_rule(entry.path.clone(), entry.to_rule());
            }
            if let Some(entry) = &self.transform.global_request {
                transform_config = transform_config.with_global_request(entry.to_rule());
            }
            if let Some(entry) = &self.transform.global_response {
                transform_config = transform_config.with_global_response(entry.to_rule());
            }
            chain = chain.push(transform_middleware(Arc::new(transform_config)));
        }

        Ok(chain.build(terminal))
    }
}
