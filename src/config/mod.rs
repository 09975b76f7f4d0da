// ABOUTME: Loads RuntimeConfig from berth.yml and BERTH_* environment variables.
// ABOUTME: File values are the base; environment overrides win.

mod env;

pub use crate::error::{Error, Result};
pub use env::{ENV_RUNTIME, ENV_SOCKET, ENV_TIMEOUT};

use crate::runtime::RuntimeConfig;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "berth.yml";
pub const CONFIG_FILENAME_ALT: &str = "berth.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".berth/config.yml";

/// Parse a YAML document into a validated config.
///
/// ```yaml
/// runtime: podman
/// socket: /run/user/1000/podman/podman.sock
/// timeout: 45s
/// ```
pub fn from_yaml(yaml: &str) -> Result<RuntimeConfig> {
    // An empty document means all defaults.
    if yaml.trim().is_empty() {
        return Ok(RuntimeConfig::default());
    }
    let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
    validate(config)
}

pub fn load(path: &Path) -> Result<RuntimeConfig> {
    let content = std::fs::read_to_string(path)?;
    from_yaml(&content)
}

/// Load the first config file found in `dir`.
pub fn discover(dir: &Path) -> Result<RuntimeConfig> {
    let candidates = [
        dir.join(CONFIG_FILENAME),
        dir.join(CONFIG_FILENAME_ALT),
        dir.join(CONFIG_FILENAME_DIR),
    ];

    for path in &candidates {
        if path.exists() {
            tracing::debug!(path = %path.display(), "loading config");
            return load(path);
        }
    }

    Err(Error::ConfigNotFound(dir.to_path_buf()))
}

pub(crate) fn validate(config: RuntimeConfig) -> Result<RuntimeConfig> {
    if config.timeout < Duration::from_secs(1) {
        return Err(Error::InvalidConfig(format!(
            "timeout must be at least 1s, got {:?}",
            config.timeout
        )));
    }
    if let Some(socket) = &config.socket
        && socket.as_os_str().is_empty()
    {
        return Err(Error::InvalidConfig("socket path is empty".to_string()));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{DEFAULT_TIMEOUT, RuntimeMode};
    use std::path::PathBuf;

    #[test]
    fn parses_full_document() {
        let config = from_yaml(
            r#"
runtime: podman
socket: /run/user/1000/podman/podman.sock
timeout: 45s
"#,
        )
        .unwrap();
        assert_eq!(config.runtime, RuntimeMode::Podman);
        assert_eq!(
            config.socket,
            Some(PathBuf::from("/run/user/1000/podman/podman.sock"))
        );
        assert_eq!(config.timeout, Duration::from_secs(45));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config = from_yaml("runtime: docker\n").unwrap();
        assert_eq!(config.runtime, RuntimeMode::Docker);
        assert!(config.socket.is_none());
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);

        assert_eq!(from_yaml("").unwrap(), RuntimeConfig::default());
    }

    #[test]
    fn rejects_unknown_runtime() {
        let err = from_yaml("runtime: containerd\n").unwrap_err();
        assert!(matches!(err, Error::Yaml(_)), "{err}");
    }

    #[test]
    fn rejects_sub_second_timeout() {
        let err = from_yaml("timeout: 500ms\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)), "{err}");
    }

    #[test]
    fn discover_prefers_primary_filename() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILENAME), "runtime: podman\n").unwrap();
        std::fs::write(dir.path().join(CONFIG_FILENAME_ALT), "runtime: docker\n").unwrap();

        let config = discover(dir.path()).unwrap();
        assert_eq!(config.runtime, RuntimeMode::Podman);
    }

    #[test]
    fn discover_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound(_)));
    }
}
