// ABOUTME: Runtime detection across the socket fallback chain.
// ABOUTME: Rootless Podman, then rootful Podman, then Docker; explicit sockets skip the chain.

use super::client::Client;
use super::connector::{self, Candidate, Connection};
use super::error::RuntimeError;
use super::types::{RuntimeConfig, RuntimeMode, RuntimeType, SocketShape, current_uid};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ROOTFUL_PODMAN: &str = "/run/podman/podman.sock";
pub const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// `/run/user/<uid>/podman/podman.sock`
pub fn rootless_podman_socket(uid: u32) -> PathBuf {
    PathBuf::from(format!("/run/user/{uid}/podman/podman.sock"))
}

/// The fallback chain for `mode`, in priority order.
///
/// 1. Rootless Podman socket (`/run/user/$UID/podman/podman.sock`)
/// 2. Rootful Podman socket (`/run/podman/podman.sock`)
/// 3. Docker socket (`/var/run/docker.sock`)
pub fn candidates(mode: RuntimeMode) -> Vec<Candidate> {
    let podman = || {
        let mut chain = Vec::with_capacity(2);
        if let Some(uid) = current_uid().filter(|uid| *uid != 0) {
            chain.push(Candidate::new(
                SocketShape::PodmanRootless,
                rootless_podman_socket(uid),
            ));
        }
        chain.push(Candidate::new(SocketShape::PodmanRootful, ROOTFUL_PODMAN));
        chain
    };
    let docker = || vec![Candidate::new(SocketShape::Docker, DOCKER_SOCKET)];

    match mode {
        RuntimeMode::Podman => podman(),
        RuntimeMode::Docker => docker(),
        RuntimeMode::Auto => {
            let mut chain = podman();
            chain.extend(docker());
            chain
        }
    }
}

/// Guess the runtime behind an explicit socket when the caller said `auto`.
pub fn infer_runtime(socket: &Path) -> RuntimeType {
    if socket.to_string_lossy().contains("podman") {
        RuntimeType::Podman
    } else {
        RuntimeType::Docker
    }
}

/// Drives the socket connector across a candidate chain.
#[derive(Debug, Clone)]
pub struct Detector {
    requested: RuntimeMode,
    candidates: Vec<Candidate>,
    timeout: Duration,
}

impl Detector {
    /// Detector over the standard chain for `mode`.
    pub fn for_mode(mode: RuntimeMode, timeout: Duration) -> Self {
        Self::new(mode, candidates(mode), timeout)
    }

    /// Detector over a custom chain, tried in order.
    pub fn new(requested: RuntimeMode, candidates: Vec<Candidate>, timeout: Duration) -> Self {
        Self {
            requested,
            candidates,
            timeout,
        }
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Connect to the first candidate that fully validates.
    pub async fn connect(&self) -> Result<Client, RuntimeError> {
        let conn = self.detect().await?;
        Ok(Client::from_connection(conn, self.timeout))
    }

    pub(crate) async fn detect(&self) -> Result<Connection, RuntimeError> {
        for candidate in &self.candidates {
            match connector::connect(candidate, self.timeout).await {
                Ok(conn) => return Ok(conn),
                Err(e) => tracing::debug!(
                    socket = %candidate.path.display(),
                    shape = ?candidate.shape,
                    "runtime candidate rejected: {}",
                    e
                ),
            }
        }

        Err(RuntimeError::NoRuntimeAvailable {
            requested: self.requested,
            checked: self.candidates.iter().map(|c| c.path.clone()).collect(),
        })
    }
}

/// Resolve `config` to a connection. An explicit socket is tried alone and
/// its failure is returned as-is.
pub(crate) async fn resolve(config: &RuntimeConfig) -> Result<Connection, RuntimeError> {
    match &config.socket {
        Some(socket) => {
            let runtime = config
                .runtime
                .as_runtime()
                .unwrap_or_else(|| infer_runtime(socket));
            let candidate = Candidate::explicit(runtime, socket);
            tracing::debug!(socket = %socket.display(), %runtime, "using explicit socket");
            connector::connect(&candidate, config.timeout).await
        }
        None => {
            Detector::for_mode(config.runtime, config.timeout)
                .detect()
                .await
        }
    }
}
