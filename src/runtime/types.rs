// ABOUTME: Runtime identity and connection configuration types.
// ABOUTME: RuntimeType, RuntimeMode, SocketShape, RuntimeConfig, RuntimeInfo.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default per-operation timeout for runtime API calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A concrete container runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeType {
    Docker,
    Podman,
}

impl std::fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeType::Docker => write!(f, "docker"),
            RuntimeType::Podman => write!(f, "podman"),
        }
    }
}

/// The runtime a caller asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    /// Try rootless Podman, rootful Podman, then Docker.
    #[default]
    Auto,
    Podman,
    Docker,
}

impl RuntimeMode {
    pub fn as_runtime(&self) -> Option<RuntimeType> {
        match self {
            RuntimeMode::Auto => None,
            RuntimeMode::Podman => Some(RuntimeType::Podman),
            RuntimeMode::Docker => Some(RuntimeType::Docker),
        }
    }
}

impl std::fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeMode::Auto => write!(f, "auto"),
            RuntimeMode::Podman => write!(f, "podman"),
            RuntimeMode::Docker => write!(f, "docker"),
        }
    }
}

impl std::str::FromStr for RuntimeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(RuntimeMode::Auto),
            "podman" => Ok(RuntimeMode::Podman),
            "docker" => Ok(RuntimeMode::Docker),
            other => Err(format!(
                "unknown runtime {other:?} (expected auto, podman or docker)"
            )),
        }
    }
}

impl From<RuntimeType> for RuntimeMode {
    fn from(runtime: RuntimeType) -> Self {
        match runtime {
            RuntimeType::Docker => RuntimeMode::Docker,
            RuntimeType::Podman => RuntimeMode::Podman,
        }
    }
}

/// Where a socket sits in the permission model. Drives remediation text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SocketShape {
    PodmanRootless,
    PodmanRootful,
    Docker,
}

impl SocketShape {
    /// Classify an arbitrary socket path for the given runtime.
    pub fn of(runtime: RuntimeType, path: &Path) -> Self {
        match runtime {
            RuntimeType::Docker => SocketShape::Docker,
            RuntimeType::Podman if path.starts_with("/run/user") => SocketShape::PodmanRootless,
            RuntimeType::Podman if path.starts_with("/run/podman") => SocketShape::PodmanRootful,
            // Sockets outside the standard locations belong to whoever owns them.
            RuntimeType::Podman if is_owned_by_current_user(path) => SocketShape::PodmanRootless,
            RuntimeType::Podman => SocketShape::PodmanRootful,
        }
    }

    pub fn runtime(&self) -> RuntimeType {
        match self {
            SocketShape::PodmanRootless | SocketShape::PodmanRootful => RuntimeType::Podman,
            SocketShape::Docker => RuntimeType::Docker,
        }
    }

    pub fn is_rootless(&self) -> bool {
        matches!(self, SocketShape::PodmanRootless)
    }
}

fn is_owned_by_current_user(path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    current_uid().is_some_and(|uid| meta.uid() == uid && uid != 0)
}

/// Effective uid of this process.
pub(crate) fn current_uid() -> Option<u32> {
    use std::os::unix::fs::MetadataExt;

    std::fs::metadata("/proc/self")
        .map(|m| m.uid())
        .ok()
        .or_else(|| std::env::var("UID").ok().and_then(|s| s.parse().ok()))
}

/// Requested connection parameters. Fixed for the lifetime of a client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RuntimeConfig {
    /// Requested runtime (`auto`, `podman`, `docker`).
    #[serde(default)]
    pub runtime: RuntimeMode,
    /// Explicit socket path. Disables auto-detection and fallback.
    #[serde(default)]
    pub socket: Option<PathBuf>,
    /// Base timeout for every runtime API call.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeMode::Auto,
            socket: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl RuntimeConfig {
    pub fn auto() -> Self {
        Self::default()
    }

    pub fn for_runtime(runtime: RuntimeType) -> Self {
        Self {
            runtime: runtime.into(),
            ..Self::default()
        }
    }

    pub fn with_socket(mut self, socket: impl Into<PathBuf>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Identity of a connected runtime. Produced once per successful connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeInfo {
    /// The runtime behind the socket.
    pub runtime_type: RuntimeType,
    /// Server version as reported by the runtime.
    pub version: String,
    /// API version the runtime speaks.
    pub api_version: String,
    /// Whether the runtime runs under the invoking user's privileges.
    pub rootless: bool,
    /// Socket the client is connected to.
    pub socket_path: PathBuf,
    /// Host operating system.
    pub os: String,
    /// Host architecture.
    pub arch: String,
}
