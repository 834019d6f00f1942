//! Component-framework wiring for the rate limiter: builds a
//! [`RateLimitMiddlewareConfig`] through the generic init/validate lifecycle
//! (spec §4.1) instead of leaving [`crate::factory`] and
//! [`crate::config::GatewayConfig`] disconnected from any real middleware.

use super::{by_ip_and_path, rate_limit_middleware, RateLimitMiddlewareConfig, RateLimitStore};
use crate::chain::Middleware;
use crate::config::RateLimitRuleConfig;
use crate::error::GatewayError;
use crate::factory::{Component, ComponentHealth, LifecycleComponent, RawConfig};
use std::sync::Arc;
use std::time::Duration;

/// A [`Component`] that turns a [`RateLimitRuleConfig`] into a ready-to-push
/// [`Middleware`], keyed by IP+path once built.
pub struct RateLimitComponent {
    store: Arc<dyn RateLimitStore>,
    config: Option<Arc<RateLimitMiddlewareConfig>>,
}

impl RateLimitComponent {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store, config: None }
    }

    /// The middleware built from this component's config, if `init` ran.
    pub fn middleware(&self) -> Option<Middleware> {
        self.config.clone().map(rate_limit_middleware)
    }
}

impl Component for RateLimitComponent {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn init(&mut self, raw_config: &RawConfig) -> Result<(), GatewayError> {
        let rule: RateLimitRuleConfig = raw_config.coerce()?;
        self.config = Some(Arc::new(RateLimitMiddlewareConfig::new(
            self.store.clone(),
            by_ip_and_path(),
            rule.rate,
            rule.burst,
            Duration::from_secs(1),
        )));
        Ok(())
    }

    fn validate(&self) -> Result<(), GatewayError> {
        if self.config.is_none() {
            return Err(GatewayError::internal("rate limit component validated before init"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl LifecycleComponent for RateLimitComponent {
    async fn start(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), GatewayError> {
        self.store.close().await;
        Ok(())
    }

    async fn health(&self) -> ComponentHealth {
        ComponentHealth::Healthy
    }
}
