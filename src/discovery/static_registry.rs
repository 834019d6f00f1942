//! Fixed, config-supplied service table — no refresh loop.

use super::ServiceRegistry;
use crate::route::Instance;
use async_trait::async_trait;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    services: HashMap<String, Vec<Instance>>,
}

impl StaticRegistry {
    pub fn new(services: HashMap<String, Vec<Instance>>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl ServiceRegistry for StaticRegistry {
    async fn get_service(&self, name: &str) -> Vec<Instance> {
        self.services.get(name).cloned().unwrap_or_default()
    }
}
