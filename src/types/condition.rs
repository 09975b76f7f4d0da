// ABOUTME: Target states a wait operation can block on.
// ABOUTME: Closed set parsed before any runtime call is made.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A container state that `Client::wait_for_condition` blocks until reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaitCondition {
    /// Container reports state `running`. Polled through inspect.
    Running,
    /// Container has exited. Delegated to the runtime's native wait.
    NotRunning,
    /// Container has been removed. Delegated to the runtime's native wait.
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid wait condition {value:?} (expected running, not-running or removed)")]
pub struct ParseConditionError {
    pub value: String,
}

impl WaitCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitCondition::Running => "running",
            WaitCondition::NotRunning => "not-running",
            WaitCondition::Removed => "removed",
        }
    }
}

impl FromStr for WaitCondition {
    type Err = ParseConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(WaitCondition::Running),
            "not-running" => Ok(WaitCondition::NotRunning),
            "removed" => Ok(WaitCondition::Removed),
            other => Err(ParseConditionError {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
