// ABOUTME: Docker variant of the runtime backend.
// ABOUTME: Everything goes through the Docker Engine API.

use super::compat::Compat;
use super::{Backend, VersionInfo};
use crate::runtime::classify::{self, BackendError};
use crate::runtime::container::{ContainerState, ListOptions, RemoveOptions};
use crate::runtime::types::RuntimeType;
use crate::types::WaitCondition;
use async_trait::async_trait;
use bollard::models::ContainerCreateBody;
use std::path::Path;
use std::time::Duration;

pub(crate) struct DockerBackend {
    compat: Compat,
}

impl DockerBackend {
    pub(crate) fn open(socket: &Path, timeout: Duration) -> Result<Self, BackendError> {
        Ok(Self {
            compat: Compat::open(socket, timeout, &classify::DOCKER)?,
        })
    }
}

#[async_trait]
impl Backend for DockerBackend {
    fn runtime(&self) -> RuntimeType {
        RuntimeType::Docker
    }

    async fn version(&self) -> Result<VersionInfo, BackendError> {
        let mut info = self.compat.version().await?;
        // Rootless Docker is not a detection candidate but may be passed explicitly.
        info.rootless = match self.compat.security_options().await {
            Ok(opts) => Some(opts.iter().any(|o| o.contains("name=rootless"))),
            Err(e) => {
                tracing::debug!("could not read docker security options: {}", e);
                None
            }
        };
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
        self.compat.inspect(id).await
    }

    async fn list(&self, opts: &ListOptions) -> Result<Vec<ContainerState>, BackendError> {
        self.compat.list(opts).await
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
