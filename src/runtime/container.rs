// ABOUTME: Backend-agnostic container description and observed state.
// ABOUTME: ContainerSpec, ContainerState, ContainerStatus, RemoveOptions, ListOptions.

use crate::types::ContainerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything needed to create a container on any supported runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Container name. Must be unique among containers on the runtime.
    pub name: String,
    /// Image reference, e.g. `docker.io/itzg/minecraft-server:java21`.
    pub image: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Host port to container port. Both sides must lie in 1..=65535.
    #[serde(default)]
    pub ports: BTreeMap<u32, u32>,
    /// Host path or named volume to container path with an optional
    /// `:ro` / `:rw` suffix (default read-write).
    #[serde(default)]
    pub volumes: BTreeMap<String, String>,
    /// Memory limit such as `"2G"`.
    #[serde(default)]
    pub memory: Option<String>,
    /// CPU quota in microseconds per 100ms period. Zero or absent is unlimited.
    #[serde(default)]
    pub cpu_quota: Option<i64>,
    #[serde(default)]
    pub working_dir: Option<String>,
    /// Command override. Empty keeps the image default.
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Default::default()
        }
    }
}

/// Lifecycle status reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Stopped,
    Exited,
    Removing,
    Dead,
    Unknown,
}

impl ContainerStatus {
    /// Map a runtime status string. Podman adds `stopped`/`stopping` to Docker's set.
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "created" | "configured" | "initialized" => ContainerStatus::Created,
            "running" => ContainerStatus::Running,
            "paused" => ContainerStatus::Paused,
            "restarting" => ContainerStatus::Restarting,
            "stopped" | "stopping" => ContainerStatus::Stopped,
            "exited" => ContainerStatus::Exited,
            "removing" => ContainerStatus::Removing,
            "dead" => ContainerStatus::Dead,
            _ => ContainerStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Paused => "paused",
            ContainerStatus::Restarting => "restarting",
            ContainerStatus::Stopped => "stopped",
            ContainerStatus::Exited => "exited",
            ContainerStatus::Removing => "removing",
            ContainerStatus::Dead => "dead",
            ContainerStatus::Unknown => "unknown",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ContainerStatus::Running)
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a container. Never cached by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerState {
    pub id: ContainerId,
    pub name: String,
    pub status: ContainerStatus,
    /// Human readable status, e.g. `Up 5 minutes` or `Exited (0)`.
    pub status_text: String,
    pub image: String,
    /// Published host port to container port.
    pub ports: BTreeMap<u16, u16>,
    pub created: Option<DateTime<Utc>>,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Kill the container first if it is running.
    pub force: bool,
    /// Also remove anonymous volumes attached to the container.
    pub remove_volumes: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Include stopped containers.
    pub all: bool,
    /// Return at most this many containers, newest first.
    pub limit: Option<usize>,
    /// Only containers carrying every label (`key=value`).
    pub labels: BTreeMap<String, String>,
}

impl ListOptions {
    pub fn all() -> Self {
        Self {
            all: true,
            ..Self::default()
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}
