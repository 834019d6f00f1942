//! Per-request context bag with typed keys (resolves spec §9's open question
//! on typed vs. untyped context keys in favor of typed).

use crate::oauth2::Claims;
use crate::route::RouteResult;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// The closed set of things middlewares stash in a request's context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKey {
    /// The matched route and selected backend instance.
    Route,
    /// Validated OAuth2/OIDC claims.
    Claims,
    /// A free-form tracking/custom key, carrying its own string tag so
    /// callers can namespace ad-hoc values without widening this enum.
    Custom(&'static str),
}

/// A typed, per-request value bag. Cheap to clone: values are `Arc`-shared.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    values: HashMap<ContextKey, Arc<dyn Any + Send + Sync>>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Send + Sync + 'static>(&mut self, key: ContextKey, value: T) {
        self.values.insert(key, Arc::new(value));
    }

    pub fn get<T: Send + Sync + 'static>(&self, key: ContextKey) -> Option<&T> {
        self.values.get(&key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn route(&self) -> Option<&RouteResult> {
        self.get::<RouteResult>(ContextKey::Route)
    }

    pub fn set_route(&mut self, route: RouteResult) {
        self.insert(ContextKey::Route, route);
    }

    pub fn claims(&self) -> Option<&Claims> {
        self.get::<Claims>(ContextKey::Claims)
    }

    pub fn set_claims(&mut self, claims: Claims) {
        self.insert(ContextKey::Claims, claims);
    }
}
