// ABOUTME: Scripted Docker/Podman API served on a Unix socket in a temp dir.
// ABOUTME: Keeps container state in memory and records every request.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Docker,
    Podman,
}

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: String,
    pub labels: BTreeMap<String, String>,
    /// (host, container)
    pub ports: Vec<(u16, u16)>,
    pub memory: i64,
}

#[derive(Debug, Default)]
pub struct State {
    pub containers: Vec<FakeContainer>,
    pub requests: Vec<String>,
    /// Answer `/version` with a client-too-new error.
    pub reject_api_version: bool,
    /// Report `rootless: true` from libpod info.
    pub rootless: bool,
    /// Inspect calls left before a created container reports running.
    pub boot_polls: usize,
    next_id: u64,
}

impl State {
    fn find(&self, key: &str) -> Option<usize> {
        self.containers
            .iter()
            .position(|c| c.id == key || c.name == key || c.id.starts_with(key))
    }

    fn add(&mut self, name: &str, image: &str) -> String {
        self.next_id += 1;
        let id = format!("{:064x}", 0xbe27_0000_u64 + self.next_id);
        self.containers.push(FakeContainer {
            id: id.clone(),
            name: name.to_string(),
            image: image.to_string(),
            status: "created".to_string(),
            labels: BTreeMap::new(),
            ports: Vec::new(),
            memory: 0,
        });
        id
    }
}

pub struct FakeDaemon {
    _dir: TempDir,
    socket: PathBuf,
    state: Arc<Mutex<State>>,
    task: JoinHandle<()>,
}

impl FakeDaemon {
    /// Serve `flavor` on a fresh socket. Podman sockets live under a
    /// `podman/` directory so runtime inference by path works.
    pub async fn start(flavor: Flavor) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let socket = match flavor {
            Flavor::Podman => {
                std::fs::create_dir(dir.path().join("podman")).unwrap();
                dir.path().join("podman/podman.sock")
            }
            Flavor::Docker => dir.path().join("docker.sock"),
        };

        let listener = UnixListener::bind(&socket).unwrap();
        let state = Arc::new(Mutex::new(State::default()));
        let task = tokio::spawn(serve(listener, state.clone(), flavor));

        Self {
            _dir: dir,
            socket,
            state,
            task,
        }
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Shared state, for scripting changes from another task.
    pub fn handle(&self) -> Arc<Mutex<State>> {
        self.state.clone()
    }

    /// Requests seen so far, as `METHOD /path` with the API version stripped.
    pub fn requests(&self) -> Vec<String> {
        self.state().requests.clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.starts_with(prefix))
            .count()
    }

    /// Seed a container directly, bypassing the API.
    pub fn seed(&self, name: &str, image: &str, status: &str) -> String {
        let mut state = self.state();
        let id = state.add(name, image);
        if let Some(c) = state.containers.last_mut() {
            c.status = status.to_string();
        }
        id
    }

    pub fn status_of(&self, name: &str) -> Option<String> {
        let state = self.state();
        state.find(name).map(|i| state.containers[i].status.clone())
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(listener: UnixListener, state: Arc<Mutex<State>>, flavor: Flavor) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            break;
        };
        let state = state.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let state = state.clone();
                async move { Ok::<_, Infallible>(handle(req, state, flavor).await) }
            });
            let _ = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await;
        });
    }
}

type Reply = Response<Full<Bytes>>;

fn reply(status: StatusCode, body: Value) -> Reply {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

fn empty(status: StatusCode) -> Reply {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

fn error(status: StatusCode, message: impl Into<String>) -> Reply {
    reply(status, json!({ "message": message.into() }))
}

fn not_found(flavor: Flavor, key: &str) -> Reply {
    let message = match flavor {
        Flavor::Docker => format!("No such container: {key}"),
        Flavor::Podman => format!("no container with name or ID \"{key}\" found: no such container"),
    };
    error(StatusCode::NOT_FOUND, message)
}

/// Drop a leading `/v1.47` or `/v4.0.0` segment.
fn strip_version(path: &str) -> &str {
    if let Some(rest) = path.strip_prefix("/v")
        && let Some(slash) = rest.find('/')
        && rest[..slash].chars().all(|c| c.is_ascii_digit() || c == '.')
    {
        return &rest[slash..];
    }
    path
}

fn query(req: &Request<Incoming>) -> HashMap<String, String> {
    req.uri()
        .query()
        .unwrap_or_default()
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| {
            let v = v.replace('+', " ");
            let v = urlencoding::decode(&v)
                .map(|d| d.into_owned())
                .unwrap_or(v);
            (k.to_string(), v)
        })
        .collect()
}

async fn handle(req: Request<Incoming>, state: Arc<Mutex<State>>, flavor: Flavor) -> Reply {
    let method = req.method().clone();
    let path = strip_version(req.uri().path()).to_string();
    let query = query(&req);
    let body = req
        .into_body()
        .collect()
        .await
        .map(|b| b.to_bytes())
        .unwrap_or_default();

    state
        .lock()
        .unwrap()
        .requests
        .push(format!("{method} {path}"));

    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    match (method.clone(), segments.as_slice()) {
        (Method::GET, ["version"]) => version(&state, flavor),
        (Method::GET | Method::HEAD, ["_ping"]) => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/plain")
            .body(Full::new(Bytes::from_static(b"OK")))
            .unwrap(),
        (Method::GET, ["info"]) => reply(
            StatusCode::OK,
            json!({ "SecurityOptions": ["name=seccomp,profile=builtin"] }),
        ),
        (Method::POST, ["containers", "create"]) => create(&state, flavor, &query, &body),
        (Method::GET, ["containers", "json"]) => list_compat(&state, &query),
        (Method::POST, ["containers", id, "start"]) => {
            transition(&state, flavor, id, |c| match c.status.as_str() {
                "running" => Err(empty(StatusCode::NOT_MODIFIED)),
                _ => Ok("running"),
            })
        }
        (Method::POST, ["containers", id, "stop"]) => {
            let stopped = match flavor {
                Flavor::Docker => "exited",
                Flavor::Podman => "stopped",
            };
            transition(&state, flavor, id, |c| match c.status.as_str() {
                "running" => Ok(stopped),
                _ => Err(empty(StatusCode::NOT_MODIFIED)),
            })
        }
        (Method::POST, ["containers", id, "restart"]) => {
            transition(&state, flavor, id, |_| Ok("running"))
        }
        (Method::POST, ["containers", id, "wait"]) => wait(&state, flavor, id, &query).await,
        (Method::DELETE, ["containers", id]) => remove(&state, flavor, id, &query),
        (Method::GET, ["containers", id, "json"]) => inspect_compat(&state, flavor, id),
        (Method::GET, ["libpod", "info"]) if flavor == Flavor::Podman => {
            let rootless = state.lock().unwrap().rootless;
            reply(
                StatusCode::OK,
                json!({
                    "host": { "security": { "rootless": rootless } },
                    "version": { "Version": "5.2.1", "APIVersion": "5.2.1" }
                }),
            )
        }
        (Method::GET, ["libpod", "containers", "json"]) if flavor == Flavor::Podman => {
            list_libpod(&state, &query)
        }
        (Method::GET, ["libpod", "containers", id, "json"]) if flavor == Flavor::Podman => {
            inspect_libpod(&state, id)
        }
        _ => error(StatusCode::NOT_FOUND, format!("page not found: {method} {path}")),
    }
}

fn version(state: &Mutex<State>, flavor: Flavor) -> Reply {
    if state.lock().unwrap().reject_api_version {
        return error(
            StatusCode::BAD_REQUEST,
            "client version 1.49 is too new. Maximum supported API version is 1.24",
        );
    }
    let (version, api) = match flavor {
        Flavor::Docker => ("27.3.1", "1.47"),
        Flavor::Podman => ("5.2.1", "1.41"),
    };
    reply(
        StatusCode::OK,
        json!({
            "Version": version,
            "ApiVersion": api,
            "MinAPIVersion": "1.24",
            "Os": "linux",
            "Arch": "amd64",
            "KernelVersion": "6.8.0"
        }),
    )
}

fn create(
    state: &Mutex<State>,
    flavor: Flavor,
    query: &HashMap<String, String>,
    body: &Bytes,
) -> Reply {
    let name = query.get("name").cloned().unwrap_or_default();
    let spec: Value = serde_json::from_slice(body).unwrap_or(Value::Null);

    let mut state = state.lock().unwrap();
    if let Some(existing) = state.find(&name).filter(|_| !name.is_empty()) {
        let other = state.containers[existing].id.clone();
        let message = match flavor {
            Flavor::Docker => format!(
                "Conflict. The container name \"/{name}\" is already in use by container \"{other}\". You have to remove (or rename) that container to be able to reuse that name."
            ),
            Flavor::Podman => format!(
                "creating container storage: the container name \"{name}\" is already in use by {other}. You have to remove that container to be able to reuse that name: that name is already in use"
            ),
        };
        return error(StatusCode::CONFLICT, message);
    }

    let image = spec["Image"].as_str().unwrap_or_default().to_string();
    let id = state.add(&name, &image);
    let container = state.containers.last_mut().unwrap();

    if let Some(labels) = spec["Labels"].as_object() {
        for (k, v) in labels {
            container
                .labels
                .insert(k.clone(), v.as_str().unwrap_or_default().to_string());
        }
    }
    if let Some(bindings) = spec["HostConfig"]["PortBindings"].as_object() {
        for (key, published) in bindings {
            let container_port: u16 = key.split('/').next().unwrap().parse().unwrap();
            for binding in published.as_array().into_iter().flatten() {
                if let Some(host) = binding["HostPort"].as_str().and_then(|h| h.parse().ok()) {
                    container.ports.push((host, container_port));
                }
            }
        }
    }
    container.memory = spec["HostConfig"]["Memory"].as_i64().unwrap_or(0);

    reply(StatusCode::CREATED, json!({ "Id": id, "Warnings": [] }))
}

fn transition(
    state: &Mutex<State>,
    flavor: Flavor,
    key: &str,
    next: impl FnOnce(&FakeContainer) -> Result<&'static str, Reply>,
) -> Reply {
    let mut state = state.lock().unwrap();
    let Some(i) = state.find(key) else {
        return not_found(flavor, key);
    };
    match next(&state.containers[i]) {
        Ok(status) => {
            state.containers[i].status = status.to_string();
            empty(StatusCode::NO_CONTENT)
        }
        Err(reply) => reply,
    }
}

fn remove(
    state: &Mutex<State>,
    flavor: Flavor,
    key: &str,
    query: &HashMap<String, String>,
) -> Reply {
    let force = query.get("force").is_some_and(|v| v == "true");
    let mut state = state.lock().unwrap();
    let Some(i) = state.find(key) else {
        return not_found(flavor, key);
    };
    if state.containers[i].status == "running" && !force {
        return error(
            StatusCode::CONFLICT,
            format!(
                "cannot remove container {key}: container is running: stop the container before removing or force remove"
            ),
        );
    }
    state.containers.remove(i);
    empty(StatusCode::NO_CONTENT)
}

async fn wait(
    state: &Mutex<State>,
    flavor: Flavor,
    key: &str,
    query: &HashMap<String, String>,
) -> Reply {
    let condition = query
        .get("condition")
        .cloned()
        .unwrap_or_else(|| "not-running".to_string());

    let id = {
        let state = state.lock().unwrap();
        match state.find(key) {
            Some(i) => state.containers[i].id.clone(),
            None => return not_found(flavor, key),
        }
    };

    for _ in 0..500 {
        let done = {
            let state = state.lock().unwrap();
            match state.find(&id) {
                None => true,
                Some(i) => condition != "removed" && state.containers[i].status != "running",
            }
        };
        if done {
            return reply(StatusCode::OK, json!({ "StatusCode": 0 }));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    error(StatusCode::INTERNAL_SERVER_ERROR, "wait gave up")
}

/// Status reported by inspect. Consumes one boot poll while a created
/// container is still "booting".
fn observed_status(state: &mut State, i: usize) -> String {
    if state.boot_polls > 0 && state.containers[i].status == "created" {
        state.boot_polls -= 1;
        if state.boot_polls == 0 {
            state.containers[i].status = "running".to_string();
        }
    }
    state.containers[i].status.clone()
}

fn port_map(c: &FakeContainer) -> Value {
    let mut map = serde_json::Map::new();
    for (host, container) in &c.ports {
        map.insert(
            format!("{container}/tcp"),
            json!([{ "HostIp": "0.0.0.0", "HostPort": host.to_string() }]),
        );
    }
    // Exposed but unpublished.
    map.insert("8080/tcp".to_string(), Value::Null);
    Value::Object(map)
}

fn inspect_compat(state: &Mutex<State>, flavor: Flavor, key: &str) -> Reply {
    let mut state = state.lock().unwrap();
    let Some(i) = state.find(key) else {
        return not_found(flavor, key);
    };
    let status = observed_status(&mut state, i);
    let c = &state.containers[i];
    reply(
        StatusCode::OK,
        json!({
            "Id": c.id,
            "Name": format!("/{}", c.name),
            "Created": "2024-05-01T12:00:00.000000000Z",
            "State": {
                "Status": status,
                "Running": status == "running",
                "StartedAt": "2024-05-01T12:00:01Z",
                "ExitCode": 0
            },
            "Config": { "Image": c.image, "Labels": c.labels },
            "HostConfig": { "Memory": c.memory },
            "NetworkSettings": { "Ports": port_map(c) }
        }),
    )
}

fn inspect_libpod(state: &Mutex<State>, key: &str) -> Reply {
    let mut state = state.lock().unwrap();
    let Some(i) = state.find(key) else {
        return not_found(Flavor::Podman, key);
    };
    let status = observed_status(&mut state, i);
    let c = &state.containers[i];
    reply(
        StatusCode::OK,
        json!({
            "Id": c.id,
            "Name": c.name,
            "Created": "2024-05-01T12:00:00.123456789Z",
            "ImageName": c.image,
            "State": {
                "Status": status,
                "Running": status == "running",
                "StartedAt": "2024-05-01T12:00:01Z",
                "ExitCode": 0
            },
            "Config": { "Labels": c.labels },
            "NetworkSettings": { "Ports": port_map(c) }
        }),
    )
}

/// Containers visible to a list call, honoring `all` and label filters.
fn visible<'a>(state: &'a State, query: &HashMap<String, String>) -> Vec<&'a FakeContainer> {
    let all = query.get("all").is_some_and(|v| v == "true" || v == "1");
    let labels: Vec<String> = query
        .get("filters")
        .and_then(|f| serde_json::from_str::<Value>(f).ok())
        .and_then(|f| f.get("label").cloned())
        .and_then(|l| serde_json::from_value(l).ok())
        .unwrap_or_default();

    let mut out: Vec<&FakeContainer> = state
        .containers
        .iter()
        .filter(|c| all || c.status == "running")
        .filter(|c| {
            labels.iter().all(|wanted| match wanted.split_once('=') {
                Some((k, v)) => c.labels.get(k).is_some_and(|have| have == v),
                None => c.labels.contains_key(wanted),
            })
        })
        .collect();
    if let Some(limit) = query.get("limit").and_then(|l| l.parse::<usize>().ok()) {
        out.truncate(limit);
    }
    out
}

fn list_compat(state: &Mutex<State>, query: &HashMap<String, String>) -> Reply {
    let state = state.lock().unwrap();
    let entries: Vec<Value> = visible(&state, query)
        .into_iter()
        .map(|c| {
            let ports: Vec<Value> = c
                .ports
                .iter()
                .map(|(host, container)| {
                    json!({ "IP": "0.0.0.0", "PrivatePort": container, "PublicPort": host, "Type": "tcp" })
                })
                .collect();
            json!({
                "Id": c.id,
                "Names": [format!("/{}", c.name)],
                "Image": c.image,
                "Created": 1714564800,
                "State": c.status,
                "Status": if c.status == "running" { "Up 5 minutes" } else { "Exited (0) 1 minute ago" },
                "Ports": ports,
                "Labels": c.labels
            })
        })
        .collect();
    reply(StatusCode::OK, Value::Array(entries))
}

fn list_libpod(state: &Mutex<State>, query: &HashMap<String, String>) -> Reply {
    let state = state.lock().unwrap();
    let entries: Vec<Value> = visible(&state, query)
        .into_iter()
        .map(|c| {
            let mut ports: Vec<Value> = c
                .ports
                .iter()
                .map(|(host, container)| {
                    json!({ "host_ip": "", "host_port": host, "container_port": container, "range": 1, "protocol": "tcp" })
                })
                .collect();
            // Malformed entry; must be skipped.
            ports.push(json!({ "host_ip": "", "host_port": "bogus", "container_port": 1 }));
            json!({
                "Id": c.id,
                "Names": [c.name],
                "Image": c.image,
                "Created": "2024-05-01T12:00:00Z",
                "State": c.status,
                "Status": "",
                "ExitCode": 0,
                "Ports": ports,
                "Labels": c.labels
            })
        })
        .collect();
    reply(StatusCode::OK, Value::Array(entries))
}
