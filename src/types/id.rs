// ABOUTME: Opaque container identifier returned by the runtime.
// ABOUTME: Accepts either a backend-assigned id or a container name.

use serde::{Deserialize, Serialize};

/// A container id or name as understood by the runtime.
///
/// Both Docker and Podman resolve either form on every container endpoint, so
/// the client never distinguishes the two.
#[must_use = "IDs reference containers and should not be ignored"]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// First twelve characters, the form both CLIs print.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(12) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContainerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ContainerId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for ContainerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
