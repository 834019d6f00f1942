//! Service-discovery registries: `ServiceRegistry::get_service(name)` backed
//! by a static table, raw Docker, or Docker Compose labels (spec §4.8).

mod docker;
mod docker_compose;
mod static_registry;

pub use docker::{DockerRegistry, DockerRegistryConfig};
pub use docker_compose::{DockerComposeRegistry, DockerComposeRegistryConfig};
pub use static_registry::StaticRegistry;

use crate::route::Instance as ServiceInstance;
use async_trait::async_trait;

/// Looks up healthy backend instances for a logical service name, refreshed
/// out-of-band by whatever poller backs the implementation.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    async fn get_service(&self, name: &str) -> Vec<ServiceInstance>;

    /// Stops any background refresh loop. A no-op for registries with none.
    async fn stop(&self) {}
}
