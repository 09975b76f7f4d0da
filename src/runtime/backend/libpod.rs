// ABOUTME: Minimal client for Podman's native libpod API over the Unix socket.
// ABOUTME: Used where the compat API reports states bollard cannot decode.

use super::{host_port, port_from_key, status_text};
use crate::runtime::classify::{BackendError, Scope, Vocabulary, error_chain};
use crate::runtime::container::{ContainerState, ContainerStatus, ListOptions};
use crate::types::ContainerId;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::net::UnixStream;

const API_PREFIX: &str = "/v4.0.0/libpod";

pub(crate) struct Libpod {
    socket: PathBuf,
    vocab: &'static Vocabulary,
}

/// Host facts from `/libpod/info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HostInfo {
    pub rootless: bool,
    pub version: String,
    pub api_version: String,
}

impl Libpod {
    pub(crate) fn new(socket: &Path, vocab: &'static Vocabulary) -> Self {
        Self {
            socket: socket.to_path_buf(),
            vocab,
        }
    }

    fn transport_error(&self, err: &dyn std::error::Error, scope: Scope) -> BackendError {
        self.vocab.classify_response(None, &error_chain(err), scope)
    }

    async fn get(&self, path: &str, scope: Scope) -> Result<Bytes, BackendError> {
        let stream = UnixStream::connect(&self.socket)
            .await
            .map_err(|e| self.transport_error(&e, scope))?;
        let io = TokioIo::new(stream);

        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| self.transport_error(&e, scope))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!("libpod connection error: {}", e);
            }
        });

        let req = hyper::Request::builder()
            .method("GET")
            .uri(format!("{API_PREFIX}{path}"))
            .header("Host", "localhost")
            .body(http_body_util::Empty::<Bytes>::new())
            .map_err(|e| BackendError::Other(format!("failed to build request: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| self.transport_error(&e, scope))?;
        let status = resp.status();

        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| self.transport_error(&e, scope))?
            .to_bytes();

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&body)
                .map(|b| b.message)
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
            return Err(self
                .vocab
                .classify_response(Some(status.as_u16()), &message, scope));
        }

        Ok(body)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, scope: Scope) -> Result<T, BackendError> {
        let body = self.get(path, scope).await?;
        serde_json::from_slice(&body)
            .map_err(|e| BackendError::Other(format!("unexpected libpod response for {path}: {e}")))
    }

    pub(crate) async fn host_info(&self) -> Result<HostInfo, BackendError> {
        let info: InfoBody = self.get_json("/info", Scope::Daemon).await?;
        Ok(HostInfo {
            rootless: info.host.security.rootless,
            version: info.version.version,
            api_version: info.version.api_version,
        })
    }

    pub(crate) async fn inspect(&self, id: &str) -> Result<ContainerState, BackendError> {
        let path = format!("/containers/{}/json", urlencoding::encode(id));
        let body: InspectBody = self.get_json(&path, Scope::Container).await?;
        Ok(body.into_state())
    }

    pub(crate) async fn list(&self, opts: &ListOptions) -> Result<Vec<ContainerState>, BackendError> {
        let entries: Vec<ListEntry> = self.get_json(&list_path(opts), Scope::Daemon).await?;
        Ok(entries.into_iter().map(ListEntry::into_state).collect())
    }
}

pub(crate) fn list_path(opts: &ListOptions) -> String {
    let mut query = vec![format!("all={}", opts.all)];
    if let Some(limit) = opts.limit {
        query.push(format!("limit={limit}"));
    }
    if !opts.labels.is_empty() {
        let labels: Vec<String> = opts
            .labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        let filters = serde_json::json!({ "label": labels });
        query.push(format!(
            "filters={}",
            urlencoding::encode(&filters.to_string())
        ));
    }
    format!("/containers/json?{}", query.join("&"))
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct InfoBody {
    host: InfoHost,
    version: InfoVersion,
}

#[derive(Debug, Deserialize)]
struct InfoHost {
    #[serde(default)]
    security: InfoSecurity,
}

#[derive(Debug, Default, Deserialize)]
struct InfoSecurity {
    #[serde(default)]
    rootless: bool,
}

#[derive(Debug, Deserialize)]
struct InfoVersion {
    #[serde(default, rename = "Version")]
    version: String,
    #[serde(default, rename = "APIVersion")]
    api_version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListEntry {
    id: String,
    #[serde(default)]
    names: Option<Vec<String>>,
    #[serde(default)]
    image: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    created: serde_json::Value,
    #[serde(default)]
    ports: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
    #[serde(default)]
    exit_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ListPort {
    host_port: u16,
    container_port: u16,
    #[serde(default = "one")]
    range: u16,
}

fn one() -> u16 {
    1
}

impl ListEntry {
    fn into_state(self) -> ContainerState {
        let status = ContainerStatus::parse(&self.state);

        let mut ports = BTreeMap::new();
        for raw in self.ports.into_iter().flatten() {
            let port = match serde_json::from_value::<ListPort>(raw) {
                Ok(p) if p.host_port > 0 && p.container_port > 0 => p,
                _ => {
                    tracing::debug!(container = %self.id, "skipping malformed port entry");
                    continue;
                }
            };
            for offset in 0..port.range.max(1) {
                if let (Some(host), Some(container)) = (
                    port.host_port.checked_add(offset),
                    port.container_port.checked_add(offset),
                ) {
                    ports.insert(host, container);
                }
            }
        }

        let status_text = if self.status.is_empty() {
            status_text(status, None, self.exit_code)
        } else {
            self.status
        };

        ContainerState {
            id: ContainerId::new(self.id),
            name: self
                .names
                .and_then(|n| n.into_iter().next())
                .unwrap_or_default(),
            status,
            status_text,
            image: self.image,
            ports,
            created: parse_created(&self.created),
            labels: self.labels.unwrap_or_default().into_iter().collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectBody {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    created: serde_json::Value,
    #[serde(default)]
    image_name: String,
    #[serde(default)]
    state: Option<InspectState>,
    #[serde(default)]
    config: Option<InspectConfig>,
    #[serde(default)]
    network_settings: Option<InspectNetwork>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    #[serde(default)]
    status: String,
    #[serde(default)]
    started_at: Option<String>,
    #[serde(default)]
    exit_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectNetwork {
    #[serde(default)]
    ports: Option<HashMap<String, Option<Vec<serde_json::Value>>>>,
}

impl InspectBody {
    fn into_state(self) -> ContainerState {
        let (status, started_at, exit_code) = match self.state {
            Some(s) => (ContainerStatus::parse(&s.status), s.started_at, s.exit_code),
            None => (ContainerStatus::Unknown, None, None),
        };

        let mut ports = BTreeMap::new();
        let published = self
            .network_settings
            .and_then(|n| n.ports)
            .unwrap_or_default();
        for (key, bindings) in published {
            let Some(container_port) = port_from_key(&key) else {
                tracing::debug!(container = %self.id, key = %key, "skipping malformed port key");
                continue;
            };
            for binding in bindings.into_iter().flatten() {
                match binding
                    .get("HostPort")
                    .and_then(|v| v.as_str())
                    .and_then(host_port)
                {
                    Some(host) => {
                        ports.insert(host, container_port);
                    }
                    None => tracing::debug!(container = %self.id, "skipping malformed port binding"),
                }
            }
        }

        ContainerState {
            status_text: status_text(status, started_at.as_deref(), exit_code),
            id: ContainerId::new(self.id),
            name: self.name.trim_start_matches('/').to_string(),
            status,
            image: self.image_name,
            ports,
            created: parse_created(&self.created),
            labels: self
                .config
                .and_then(|c| c.labels)
                .unwrap_or_default()
                .into_iter()
                .collect(),
        }
    }
}

/// Podman reports creation time as RFC 3339 text or, in older list
/// responses, as unix seconds.
fn parse_created(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        serde_json::Value::Number(n) => n.as_i64().and_then(|s| DateTime::from_timestamp(s, 0)),
        _ => None,
    }
}
