// ABOUTME: Closed error taxonomy for runtime detection and container operations.
// ABOUTME: Each variant names the runtime and socket that produced it.

use snafu::Snafu;
use std::path::PathBuf;
use std::time::Duration;

use super::remediation;
use super::types::{RuntimeMode, RuntimeType, SocketShape};
use crate::types::{ParseConditionError, ParseMemoryError};

/// The runtime and socket an error came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub runtime: RuntimeType,
    pub socket: PathBuf,
}

impl Endpoint {
    pub fn new(runtime: RuntimeType, socket: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            socket: socket.into(),
        }
    }

    pub fn shape(&self) -> SocketShape {
        SocketShape::of(self.runtime, &self.socket)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.runtime, self.socket.display())
    }
}

/// Which side of a port mapping failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSide {
    Host,
    Container,
}

impl std::fmt::Display for PortSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortSide::Host => write!(f, "host"),
            PortSide::Container => write!(f, "container"),
        }
    }
}

/// Error raised by the runtime client.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RuntimeError {
    #[snafu(display("{endpoint}: daemon is not running: {message}"))]
    DaemonNotRunning { endpoint: Endpoint, message: String },

    #[snafu(display("{endpoint}: socket not found"))]
    SocketNotFound { endpoint: Endpoint },

    #[snafu(display("{endpoint}: API version mismatch: {message}"))]
    ApiVersionMismatch { endpoint: Endpoint, message: String },

    #[snafu(display("{endpoint}: permission denied: {source}"))]
    PermissionDenied {
        endpoint: Endpoint,
        source: std::io::Error,
    },

    #[snafu(display(
        "no container runtime available (requested {requested}, checked {})",
        join_paths(checked)
    ))]
    NoRuntimeAvailable {
        requested: RuntimeMode,
        checked: Vec<PathBuf>,
    },

    #[snafu(display("{endpoint}: container not found: {container}"))]
    ContainerNotFound { endpoint: Endpoint, container: String },

    #[snafu(display("{endpoint}: container already exists: {name}"))]
    ContainerAlreadyExists { endpoint: Endpoint, name: String },

    #[snafu(display("{endpoint}: {source}"))]
    InvalidMemoryFormat {
        endpoint: Endpoint,
        source: ParseMemoryError,
    },

    #[snafu(display("{endpoint}: {source}"))]
    InvalidCondition {
        endpoint: Endpoint,
        source: ParseConditionError,
    },

    #[snafu(display("{endpoint}: invalid {side} port {port} (must be 1-65535)"))]
    InvalidPort {
        endpoint: Endpoint,
        side: PortSide,
        port: u32,
    },

    #[snafu(display("{endpoint}: invalid volume {entry:?}: {reason}"))]
    InvalidVolume {
        endpoint: Endpoint,
        entry: String,
        reason: &'static str,
    },

    #[snafu(display("{endpoint}: {operation} cancelled"))]
    Cancelled {
        endpoint: Endpoint,
        operation: &'static str,
    },

    #[snafu(display("{endpoint}: {operation} timed out after {}s", after.as_secs()))]
    Timeout {
        endpoint: Endpoint,
        operation: &'static str,
        after: Duration,
    },

    #[snafu(display("{endpoint}: connection failed: {message}"))]
    Connection { endpoint: Endpoint, message: String },

    #[snafu(display("{endpoint}: {operation} failed: {message}"))]
    Backend {
        endpoint: Endpoint,
        operation: &'static str,
        message: String,
    },

    #[snafu(display("{endpoint}: client closed"))]
    Closed { endpoint: Endpoint },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DaemonNotRunning,
    SocketNotFound,
    ApiVersionMismatch,
    PermissionDenied,
    NoRuntimeAvailable,
    ContainerNotFound,
    ContainerAlreadyExists,
    InvalidMemoryFormat,
    InvalidCondition,
    /// Port or volume entry failed validation.
    InvalidSpec,
    Cancelled,
    Timeout,
    /// Handshake failed for a reason other than a stopped daemon.
    Connection,
    /// Any other runtime failure, including use after close.
    Backend,
}

impl RuntimeError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::DaemonNotRunning { .. } => ErrorKind::DaemonNotRunning,
            RuntimeError::SocketNotFound { .. } => ErrorKind::SocketNotFound,
            RuntimeError::ApiVersionMismatch { .. } => ErrorKind::ApiVersionMismatch,
            RuntimeError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            RuntimeError::NoRuntimeAvailable { .. } => ErrorKind::NoRuntimeAvailable,
            RuntimeError::ContainerNotFound { .. } => ErrorKind::ContainerNotFound,
            RuntimeError::ContainerAlreadyExists { .. } => ErrorKind::ContainerAlreadyExists,
            RuntimeError::InvalidMemoryFormat { .. } => ErrorKind::InvalidMemoryFormat,
            RuntimeError::InvalidCondition { .. } => ErrorKind::InvalidCondition,
            RuntimeError::InvalidPort { .. } | RuntimeError::InvalidVolume { .. } => {
                ErrorKind::InvalidSpec
            }
            RuntimeError::Cancelled { .. } => ErrorKind::Cancelled,
            RuntimeError::Timeout { .. } => ErrorKind::Timeout,
            RuntimeError::Connection { .. } => ErrorKind::Connection,
            RuntimeError::Backend { .. } | RuntimeError::Closed { .. } => ErrorKind::Backend,
        }
    }

    /// The runtime and socket behind this error, if it came from one.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        match self {
            RuntimeError::NoRuntimeAvailable { .. } => None,
            RuntimeError::DaemonNotRunning { endpoint, .. }
            | RuntimeError::SocketNotFound { endpoint }
            | RuntimeError::ApiVersionMismatch { endpoint, .. }
            | RuntimeError::PermissionDenied { endpoint, .. }
            | RuntimeError::ContainerNotFound { endpoint, .. }
            | RuntimeError::ContainerAlreadyExists { endpoint, .. }
            | RuntimeError::InvalidMemoryFormat { endpoint, .. }
            | RuntimeError::InvalidCondition { endpoint, .. }
            | RuntimeError::InvalidPort { endpoint, .. }
            | RuntimeError::InvalidVolume { endpoint, .. }
            | RuntimeError::Cancelled { endpoint, .. }
            | RuntimeError::Timeout { endpoint, .. }
            | RuntimeError::Connection { endpoint, .. }
            | RuntimeError::Backend { endpoint, .. }
            | RuntimeError::Closed { endpoint } => Some(endpoint),
        }
    }

    /// Actionable guidance for this error, if any exists.
    pub fn remediation(&self) -> Option<String> {
        match self {
            RuntimeError::DaemonNotRunning { endpoint, .. } => {
                Some(remediation::daemon_not_running(endpoint.shape()))
            }
            RuntimeError::SocketNotFound { endpoint } => Some(remediation::socket_not_found(
                endpoint.shape(),
                &endpoint.socket,
            )),
            RuntimeError::ApiVersionMismatch { endpoint, .. } => {
                Some(remediation::api_version_mismatch(endpoint.runtime))
            }
            RuntimeError::PermissionDenied { endpoint, .. } => Some(
                remediation::permission_denied(endpoint.shape(), &endpoint.socket),
            ),
            RuntimeError::NoRuntimeAvailable { requested, .. } => {
                Some(remediation::no_runtime_available(*requested))
            }
            RuntimeError::ContainerNotFound {
                endpoint,
                container,
            } => Some(remediation::container_not_found(endpoint.runtime, container)),
            RuntimeError::ContainerAlreadyExists { endpoint, name } => Some(
                remediation::container_already_exists(endpoint.runtime, name),
            ),
            RuntimeError::InvalidMemoryFormat { .. } => Some(remediation::invalid_memory()),
            _ => None,
        }
    }

    /// Error message followed by its remediation text.
    pub fn report(&self) -> String {
        match self.remediation() {
            Some(help) => format!("{self}\n\n{help}"),
            None => self.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::ContainerNotFound
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "no sockets".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
