// ABOUTME: Podman variant of the runtime backend.
// ABOUTME: Lifecycle calls use the compat API; inspect, list and host info use libpod.

use super::compat::Compat;
use super::libpod::Libpod;
use super::{Backend, VersionInfo};
use crate::runtime::classify::{self, BackendError};
use crate::runtime::container::{ContainerState, ListOptions, RemoveOptions};
use crate::runtime::types::RuntimeType;
use crate::types::WaitCondition;
use async_trait::async_trait;
use bollard::models::ContainerCreateBody;
use std::path::Path;
use std::time::Duration;

/// Podman reports `stopping`/`stopped`/`configured` states that the compat
/// models reject, so state queries go through libpod.
pub(crate) struct PodmanBackend {
    compat: Compat,
    libpod: Libpod,
}

impl PodmanBackend {
    pub(crate) fn open(socket: &Path, timeout: Duration) -> Result<Self, BackendError> {
        Ok(Self {
            compat: Compat::open(socket, timeout, &classify::PODMAN)?,
            libpod: Libpod::new(socket, &classify::PODMAN),
        })
    }
}

#[async_trait]
impl Backend for PodmanBackend {
    fn runtime(&self) -> RuntimeType {
        RuntimeType::Podman
    }

    async fn version(&self) -> Result<VersionInfo, BackendError> {
        let mut info = self.compat.version().await?;
        match self.libpod.host_info().await {
            Ok(host) => {
                info.rootless = Some(host.rootless);
                if !host.version.is_empty() {
                    info.version = host.version;
                }
                tracing::debug!(libpod_api = %host.api_version, "read libpod host info");
            }
            Err(e) => tracing::debug!("libpod info unavailable: {}", e),
        }
        Ok(info)
    }

    async fn ping(&self) -> Result<(), BackendError> {
        self.compat.ping().await
    }

    async fn create(&self, name: &str, body: ContainerCreateBody) -> Result<String, BackendError> {
        self.compat.create(name, body).await
    }

    async fn start(&self, id: &str) -> Result<(), BackendError> {
        self.compat.start(id).await
    }

    async fn stop(
        &self,
        id: &str,
        grace: Option<Duration>,
        transport: Duration,
    ) -> Result<(), BackendError> {
        self.compat.stop(id, grace, transport).await
    }

    async fn restart(
        &self,
        id: &str,
        grace: Option<Duration>,
        transport: Duration,
    ) -> Result<(), BackendError> {
        self.compat.restart(id, grace, transport).await
    }

    async fn remove(&self, id: &str, opts: RemoveOptions) -> Result<(), BackendError> {
        self.compat.remove(id, opts).await
    }

    async fn inspect(&self, id: &str) -> Result<ContainerState, BackendError> {
        self.libpod.inspect(id).await
    }

    async fn list(&self, opts: &ListOptions) -> Result<Vec<ContainerState>, BackendError> {
        self.libpod.list(opts).await
    }

    async fn wait(
        &self,
        id: &str,
        condition: WaitCondition,
        transport: Duration,
    ) -> Result<(), BackendError> {
        self.compat.wait(id, condition, transport).await
    }
}
