//! Component framework: uniform init/validate lifecycle plus a named
//! registry of creators (spec §4.1).

use crate::error::GatewayError;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Raw configuration handed to a component's `init`. When the caller already
/// holds the concrete config type, pass it via [`RawConfig::typed`] for a
/// direct downcast; otherwise [`RawConfig::json`] round-trips through
/// `serde_json` (spec §4.1: "when the supplied raw config and target type
/// match exactly, assignment is direct; otherwise round-trip through a
/// canonical serialization").
#[derive(Clone)]
pub enum RawConfig {
    Typed(Arc<dyn Any + Send + Sync>),
    Json(serde_json::Value),
}

impl RawConfig {
    pub fn typed<T: Send + Sync + 'static>(value: T) -> Self {
        RawConfig::Typed(Arc::new(value))
    }

    pub fn json(value: serde_json::Value) -> Self {
        RawConfig::Json(value)
    }

    /// Coerces this raw config into `T`, preferring a direct downcast over
    /// a JSON round-trip.
    pub fn coerce<T>(&self) -> Result<T, GatewayError>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        match self {
            RawConfig::Typed(value) => match value.clone().downcast::<T>() {
                Ok(typed) => Ok((*typed).clone()),
                Err(_) => Err(GatewayError::internal("config type mismatch and no JSON fallback available")),
            },
            RawConfig::Json(value) => serde_json::from_value(value.clone())
                .map_err(|e| GatewayError::internal("config deserialization failed").with_cause(e)),
        }
    }
}

/// A health signal for a [`LifecycleComponent`] (spec §4.1, supplemented
/// per SPEC_FULL §B with a `ComponentHealth` hook for pollers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

/// The uniform component lifecycle: init from config, report a stable name,
/// validate post-init invariants.
pub trait Component: Send + Sync {
    fn name(&self) -> &'static str;

    fn init(&mut self, config: &RawConfig) -> Result<(), GatewayError>;

    fn validate(&self) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// Components with background work (JWKS refresh, discovery polling) also
/// expose start/stop/health.
#[async_trait::async_trait]
pub trait LifecycleComponent: Component {
    async fn start(&self) -> Result<(), GatewayError>;

    async fn stop(&self) -> Result<(), GatewayError>;

    async fn health(&self) -> ComponentHealth;
}

/// Wraps init+validate, tagging any error with the component's name
/// (spec §4.1's generic `build`).
pub fn build(component: &mut dyn Component, raw_config: &RawConfig) -> Result<(), GatewayError> {
    let name = component.name();
    component.init(raw_config).map_err(|e| e.with_detail("component", name))?;
    component.validate().map_err(|e| e.with_detail("component", name))?;
    Ok(())
}

type Creator = Box<dyn Fn() -> Box<dyn Component> + Send + Sync>;

/// A registry of named component creators. Registration rejects duplicates;
/// creation instantiates and runs init+validate in one step.
pub struct ComponentRegistry {
    creators: RwLock<HashMap<&'static str, Creator>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self { creators: RwLock::new(HashMap::new()) }
    }

    pub fn register<F>(&self, name: &'static str, creator: F) -> Result<(), GatewayError>
    where
        F: Fn() -> Box<dyn Component> + Send + Sync + 'static,
    {
        let mut creators = self.creators.write();
        if creators.contains_key(name) {
            return Err(GatewayError::internal(format!("component '{}' already registered", name)));
        }
        creators.insert(name, Box::new(creator));
        Ok(())
    }

    pub fn create(&self, name: &str, raw_config: &RawConfig) -> Result<Box<dyn Component>, GatewayError> {
        let creators = self.creators.read();
        let creator = creators
            .get(name)
            .ok_or_else(|| GatewayError::not_found(format!("no component registered under '{}'", name)))?;
        let mut component = creator();
        drop(creators);
        build(component.as_mut(), raw_config)?;
        Ok(component)
    }

    pub fn list(&self) -> Vec<&'static str> {
        self.creators.read().keys().copied().collect()
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Deserialize, PartialEq)]
    struct DummyConfig {
        limit: u32,
    }

    struct DummyComponent {
        limit: u32,
    }

    impl Component for DummyComponent {
        fn name(&self) -> &'static str {
            "dummy"
        }

        fn init(&mut self, config: &RawConfig) -> Result<(), GatewayError> {
            let parsed: DummyConfig = config.coerce()?;
            self.limit = parsed.limit;
            Ok(())
        }

        fn validate(&self) -> Result<(), GatewayError> {
            if self.limit == 0 {
                return Err(GatewayError::bad_request("limit must be positive"));
            }
            Ok(())
        }
    }

    #[test]
    fn coerce_direct_downcast_matches_typed_config() {
        let raw = RawConfig::typed(DummyConfig { limit: 5 });
        let parsed: DummyConfig = raw.coerce().unwrap();
        assert_eq!(parsed, DummyConfig { limit: 5 });
    }

    #[test]
    fn coerce_json_round_trip() {
        let raw = RawConfig::json(serde_json::json!({"limit": 7}));
        let parsed: DummyConfig = raw.coerce().unwrap();
        assert_eq!(parsed, DummyConfig { limit: 7 });
    }

    #[test]
    fn registry_rejects_duplicate_registration() {
        let registry = ComponentRegistry::new();
        registry.register("dummy", || Box::new(DummyComponent { limit: 0 })).unwrap();
        let err = registry.register("dummy", || Box::new(DummyComponent { limit: 0 })).unwrap_err();
        assert!(err.message.contains("already registered"));
    }

    #[test]
    fn create_runs_init_and_validate() {
        let registry = ComponentRegistry::new();
        registry.register("dummy", || Box::new(DummyComponent { limit: 0 })).unwrap();
        let component = registry.create("dummy", &RawConfig::json(serde_json::json!({"limit": 3}))).unwrap();
        assert_eq!(component.name(), "dummy");
    }

    #[test]
    fn create_propagates_validate_failure_tagged_with_component_name() {
        let registry = ComponentRegistry::new();
        registry.register("dummy", || Box::new(DummyComponent { limit: 0 })).unwrap();
        let err = registry.create("dummy", &RawConfig::json(serde_json::json!({"limit": 0}))).unwrap_err();
        assert_eq!(err.details.get("component").map(String::as_str), Some("dummy"));
    }

    #[test]
    fn create_unknown_component_returns_not_found() {
        let registry = ComponentRegistry::new();
        let err = registry.create("missing", &RawConfig::json(serde_json::json!({}))).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::NotFound);
    }
}
