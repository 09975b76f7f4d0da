// ABOUTME: Capability trait implemented once per runtime, selected at connect time.
// ABOUTME: Docker speaks the compat API; Podman adds libpod endpoints for state queries.

mod compat;
mod docker;
mod libpod;
mod podman;

pub(crate) use docker::DockerBackend;
pub(crate) use podman::PodmanBackend;

use super::classify::BackendError;
use super::container::{ContainerState, ContainerStatus, ListOptions, RemoveOptions};
use super::types::{RuntimeType, SocketShape};
use crate::types::WaitCondition;
use async_trait::async_trait;
use bollard::models::ContainerCreateBody;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// What the handshake learns about the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct VersionInfo {
    pub version: String,
    pub api_version: String,
    pub os: String,
    pub arch: String,
    /// Reported by the runtime itself when it exposes it.
    pub rootless: Option<bool>,
}

/// Container operations against one runtime socket.
///
/// Implementations classify every failure into a `BackendError` before
/// returning; callers never look at backend error text.
#[async_trait]
pub(crate) trait Backend: Send + Sync {
    fn runtime(&self) -> RuntimeType;

    /// Full protocol handshake.
    async fn version(&self) -> Result<VersionInfo, BackendError>;

    /// Cheap liveness round-trip.
    async fn ping(&self) -> Result<(), BackendError>;

    async fn create(&self, name: &str, body: ContainerCreateBody) -> Result<String, BackendError>;

    async fn start(&self, id: &str) -> Result<(), BackendError>;

    /// `transport` bounds the API call; `grace` is what the workload gets.
    async fn stop(
        &self,
        id: &str,
        grace: Option<Duration>,
        transport: Duration,
    ) -> Result<(), BackendError>;

    async fn restart(
        &self,
        id: &str,
        grace: Option<Duration>,
        transport: Duration,
    ) -> Result<(), BackendError>;

    async fn remove(&self, id: &str, opts: RemoveOptions) -> Result<(), BackendError>;

    async fn inspect(&self, id: &str) -> Result<ContainerState, BackendError>;

    async fn list(&self, opts: &ListOptions) -> Result<Vec<ContainerState>, BackendError>;

    /// Native blocking wait. Only `NotRunning` and `Removed` are passed here.
    async fn wait(
        &self,
        id: &str,
        condition: WaitCondition,
        transport: Duration,
    ) -> Result<(), BackendError>;
}

/// Open the backend variant for `shape` on `socket`. Does not touch the socket.
pub(crate) fn open(
    shape: SocketShape,
    socket: &Path,
    timeout: Duration,
) -> Result<Arc<dyn Backend>, BackendError> {
    Ok(match shape.runtime() {
        RuntimeType::Docker => Arc::new(DockerBackend::open(socket, timeout)?),
        RuntimeType::Podman => Arc::new(PodmanBackend::open(socket, timeout)?),
    })
}

/// Parse a `"25565/tcp"` style port key into the container port.
pub(crate) fn port_from_key(key: &str) -> Option<u16> {
    let port = key.split('/').next()?;
    port.parse().ok().filter(|p| *p > 0)
}

/// Parse a published host port string. Empty or zero means unpublished.
pub(crate) fn host_port(raw: &str) -> Option<u16> {
    raw.trim().parse().ok().filter(|p| *p > 0)
}

/// Human readable status when the runtime did not supply one.
pub(crate) fn status_text(
    status: ContainerStatus,
    started_at: Option<&str>,
    exit_code: Option<i64>,
) -> String {
    match (status, started_at, exit_code) {
        (ContainerStatus::Running, Some(since), _) if !since.is_empty() => {
            format!("Up since {since}")
        }
        (ContainerStatus::Running, _, _) => "Up".to_string(),
        (ContainerStatus::Exited | ContainerStatus::Stopped, _, Some(code)) => {
            format!("Exited ({code})")
        }
        (ContainerStatus::Created, _, _) => "Created".to_string(),
        (other, _, _) => capitalize(other.as_str()),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub(crate) fn into_btree<K: Ord, V>(
    map: impl IntoIterator<Item = (K, V)>,
) -> BTreeMap<K, V> {
    map.into_iter().collect()
}
