// ABOUTME: Container runtime client for Docker and Podman.
// ABOUTME: Auto-detects the available runtime and exposes one lifecycle surface.

mod backend;
mod classify;
mod client;
mod connector;
mod container;
mod detection;
mod error;
pub mod remediation;
mod translate;
mod types;

pub use client::{
    Client, DEFAULT_POLL_INTERVAL, RESTART_TRANSPORT_BUFFER, STOP_TRANSPORT_BUFFER,
    restart_transport_timeout, stop_transport_timeout,
};
pub use connector::{Candidate, PROBE_TIMEOUT};
pub use container::{ContainerSpec, ContainerState, ContainerStatus, ListOptions, RemoveOptions};
pub use detection::{
    DOCKER_SOCKET, Detector, ROOTFUL_PODMAN, candidates, infer_runtime, rootless_podman_socket,
};
pub use error::{Endpoint, ErrorKind, PortSide, RuntimeError};
pub use translate::{CPU_PERIOD_MICROS, TranslateError, VolumeMount, parse_volume, translate};
pub use types::{
    DEFAULT_TIMEOUT, RuntimeConfig, RuntimeInfo, RuntimeMode, RuntimeType, SocketShape,
};

/// Connect using `config`: detection when no socket is set, otherwise the
/// explicit socket alone.
pub async fn connect(config: &RuntimeConfig) -> Result<Client, RuntimeError> {
    Client::connect(config).await
}
