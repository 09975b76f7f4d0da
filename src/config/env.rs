// ABOUTME: BERTH_* environment overrides for RuntimeConfig.
// ABOUTME: Unset or empty variables leave the config untouched.

use super::{Error, Result, validate};
use crate::runtime::{RuntimeConfig, RuntimeMode};
use humantime_serde::re::humantime;
use std::path::PathBuf;

pub const ENV_RUNTIME: &str = "BERTH_RUNTIME";
pub const ENV_SOCKET: &str = "BERTH_SOCKET";
pub const ENV_TIMEOUT: &str = "BERTH_TIMEOUT";

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl RuntimeConfig {
    /// Apply `BERTH_RUNTIME`, `BERTH_SOCKET` and `BERTH_TIMEOUT` on top of self.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(raw) = var(ENV_RUNTIME) {
            self.runtime = raw
                .trim()
                .parse::<RuntimeMode>()
                .map_err(|e| Error::InvalidConfig(format!("{ENV_RUNTIME}: {e}")))?;
        }
        if let Some(raw) = var(ENV_SOCKET) {
            self.socket = Some(PathBuf::from(raw));
        }
        if let Some(raw) = var(ENV_TIMEOUT) {
            self.timeout = humantime::parse_duration(raw.trim())
                .map_err(|e| Error::InvalidConfig(format!("{ENV_TIMEOUT}: {e}")))?;
        }
        validate(self)
    }
}
