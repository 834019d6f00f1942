//! Raw-Docker service discovery: the same polling/label shape as
//! [`super::docker_compose::DockerComposeRegistry`], but without the
//! `com.docker.compose.project` filter — every running container is a
//! candidate, keyed by its first container name (spec §4.8, "a raw-docker
//! variant follows the same shape").

use super::ServiceRegistry;
use crate::route::Instance;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::Docker;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct DockerRegistryConfig {
    pub label_prefix: String,
    pub refresh_interval: Duration,
}

impl Default for DockerRegistryConfig {
    fn default() -> Self {
        Self { label_prefix: "gateway".to_string(), refresh_interval: Duration::from_secs(10) }
    }
}

fn container_service_name(summary: &bollard::models::ContainerSummary) -> Option<String> {
    summary.names.as_ref()?.first().map(|n| n.trim_start_matches('/').to_string())
}

/// Polls all running containers on the host, regardless of Compose project,
/// and exposes them keyed by container name.
pub struct DockerRegistry {
    config: DockerRegistryConfig,
    docker: Docker,
    services: Arc<ArcSwap<HashMap<String, Vec<Instance>>>>,
    stopped: Arc<AtomicBool>,
    loop_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl DockerRegistry {
    pub fn new(docker: Docker, config: DockerRegistryConfig) -> Arc<Self> {
        let registry = Arc::new(Self {
            config,
            docker,
            services: Arc::new(ArcSwap::from_pointee(HashMap::new())),
            stopped: Arc::new(AtomicBool::new(false)),
            loop_handle: std::sync::Mutex::new(None),
        });
        registry.clone().spawn_refresh_loop();
        registry
    }

    fn spawn_refresh_loop(self: Arc<Self>) {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.refresh_interval);
            loop {
                ticker.tick().await;
                if self.stopped.load(Ordering::SeqCst) {
                    return;
                }
                if let Err(err) = self.refresh_once().await {
                    tracing::warn!(error = %err, "docker registry refresh failed, keeping previous snapshot");
                }
            }
        });
        *self.loop_handle.lock().unwrap() = Some(handle);
    }

    async fn refresh_once(&self) -> Result<(), bollard::errors::Error> {
        let mut filters = HashMap::new();
        filters.insert("status".to_string(), vec!["running".to_string()]);
        let options = ListContainersOptions::<String> { all: false, filters, ..Default::default() };
        let containers = self.docker.list_containers(Some(options)).await?;

        let mut fresh: HashMap<String, Vec<Instance>> = HashMap::new();
        for summary in &containers {
            let Some(name) = container_service_name(summary) else { continue };
            let id = summary.id.clone().unwrap_or_default();
            let raw = super::docker_compose::from_bollard_summary(summary);
            if let Some(instance) = super::docker_compose::resolve_exposed_instance(&id, &raw, &self.config.label_prefix) {
                fresh.entry(name).or_default().push(instance);
            }
        }
        self.services.store(Arc::new(fresh));
        Ok(())
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.loop_handle.lock().unwrap().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl ServiceRegistry for DockerRegistry {
    async fn get_service(&self, name: &str) -> Vec<Instance> {
        self.services.load().get(name).cloned().unwrap_or_default()
    }

    async fn stop(&self) {
        DockerRegistry::stop(self);
    }
}
