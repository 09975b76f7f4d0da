// ABOUTME: Validates and opens a connection to one candidate runtime socket.
// ABOUTME: Existence check, cheap permission probe, handshake, then a ping.

use super::backend::{self, Backend};
use super::classify::BackendError;
use super::error::{Endpoint, RuntimeError};
use super::types::{RuntimeInfo, RuntimeType, SocketShape};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UnixStream;

/// Upper bound for the dial-and-close permission probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// One socket the detector may try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub shape: SocketShape,
    pub path: PathBuf,
}

impl Candidate {
    pub fn new(shape: SocketShape, path: impl Into<PathBuf>) -> Self {
        Self {
            shape,
            path: path.into(),
        }
    }

    /// Candidate for an explicit socket, classifying its shape from the path.
    pub fn explicit(runtime: RuntimeType, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            shape: SocketShape::of(runtime, &path),
            path,
        }
    }

    pub fn runtime(&self) -> RuntimeType {
        self.shape.runtime()
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.runtime(), &self.path)
    }
}

/// A validated, responsive runtime connection.
pub(crate) struct Connection {
    pub backend: Arc<dyn Backend>,
    pub info: RuntimeInfo,
}

/// Connect to `candidate`, spending at most `timeout` on each protocol step.
pub(crate) async fn connect(
    candidate: &Candidate,
    timeout: Duration,
) -> Result<Connection, RuntimeError> {
    let endpoint = candidate.endpoint();

    if let Some(err) = existence_error(&endpoint, tokio::fs::try_exists(&candidate.path).await) {
        return Err(err);
    }

    probe_permissions(&candidate.path, timeout.min(PROBE_TIMEOUT))
        .await
        .map_err(|source| RuntimeError::PermissionDenied {
            endpoint: endpoint.clone(),
            source,
        })?;

    let backend = backend::open(candidate.shape, &candidate.path, timeout)
        .map_err(|e| handshake_error(&endpoint, e))?;

    let version = match tokio::time::timeout(timeout, backend.version()).await {
        Ok(result) => result.map_err(|e| handshake_error(&endpoint, e))?,
        Err(_) => {
            return Err(RuntimeError::DaemonNotRunning {
                endpoint,
                message: format!("handshake timed out after {}s", timeout.as_secs()),
            });
        }
    };

    match tokio::time::timeout(timeout, backend.ping()).await {
        Ok(result) => result.map_err(|e| handshake_error(&endpoint, e))?,
        Err(_) => {
            return Err(RuntimeError::DaemonNotRunning {
                endpoint,
                message: format!("ping timed out after {}s", timeout.as_secs()),
            });
        }
    }

    let info = RuntimeInfo {
        runtime_type: backend.runtime(),
        version: version.version,
        api_version: version.api_version,
        rootless: version.rootless.unwrap_or(candidate.shape.is_rootless()),
        socket_path: candidate.path.clone(),
        os: version.os,
        arch: version.arch,
    };

    tracing::info!(
        runtime = %info.runtime_type,
        version = %info.version,
        api = %info.api_version,
        rootless = info.rootless,
        socket = %info.socket_path.display(),
        "connected to container runtime"
    );

    Ok(Connection { backend, info })
}

/// Map the result of checking the socket path. A parent directory we may not
/// traverse is a permission problem, not a missing socket.
fn existence_error(endpoint: &Endpoint, exists: std::io::Result<bool>) -> Option<RuntimeError> {
    let endpoint = endpoint.clone();
    match exists {
        Ok(true) => None,
        Ok(false) => Some(RuntimeError::SocketNotFound { endpoint }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Some(RuntimeError::SocketNotFound { endpoint })
        }
        Err(source) if source.kind() == std::io::ErrorKind::PermissionDenied => {
            Some(RuntimeError::PermissionDenied { endpoint, source })
        }
        Err(e) => Some(RuntimeError::Connection {
            endpoint,
            message: format!("cannot stat socket: {e}"),
        }),
    }
}

/// Dial and immediately close the socket. Only a permission refusal is an
/// error here; anything else is left for the handshake to diagnose.
async fn probe_permissions(path: &Path, limit: Duration) -> Result<(), std::io::Error> {
    match tokio::time::timeout(limit, UnixStream::connect(path)).await {
        Ok(Ok(stream)) => {
            drop(stream);
            Ok(())
        }
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::PermissionDenied => Err(e),
        Ok(Err(e)) => {
            tracing::debug!(socket = %path.display(), "probe dial failed: {}", e);
            Ok(())
        }
        Err(_) => {
            tracing::debug!(socket = %path.display(), "probe dial timed out");
            Ok(())
        }
    }
}

fn handshake_error(endpoint: &Endpoint, err: BackendError) -> RuntimeError {
    let endpoint = endpoint.clone();
    match err {
        BackendError::Unreachable(message) => RuntimeError::DaemonNotRunning { endpoint, message },
        BackendError::ApiVersion(message) => RuntimeError::ApiVersionMismatch { endpoint, message },
        BackendError::PermissionDenied(message) => RuntimeError::PermissionDenied {
            endpoint,
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, message),
        },
        other => RuntimeError::Connection {
            endpoint,
            message: other.to_string(),
        },
    }
}
