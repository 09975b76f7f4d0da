// ABOUTME: Uniform container lifecycle operations over any detected runtime.
// ABOUTME: Bounds every call by timeout and caller cancellation; never caches state.

use super::backend::Backend;
use super::classify::BackendError;
use super::connector::Connection;
use super::container::{ContainerSpec, ContainerState, ListOptions, RemoveOptions};
use super::detection;
use super::error::{Endpoint, RuntimeError};
use super::translate::{TranslateError, translate};
use super::types::{RuntimeConfig, RuntimeInfo, RuntimeType};
use crate::types::{ContainerId, WaitCondition};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Interval between inspect probes while waiting for `running`.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Added to the grace period to get the stop call's transport timeout.
pub const STOP_TRANSPORT_BUFFER: Duration = Duration::from_secs(15);

/// Added to the grace period to get the restart call's transport timeout.
pub const RESTART_TRANSPORT_BUFFER: Duration = Duration::from_secs(20);

/// How long the client waits for the runtime to acknowledge a stop.
///
/// Without a grace period the runtime default applies and the base timeout
/// bounds the call.
pub fn stop_transport_timeout(grace: Option<Duration>, base: Duration) -> Duration {
    grace.map_or(base, |g| g.saturating_add(STOP_TRANSPORT_BUFFER))
}

/// How long the client waits for the runtime to acknowledge a restart.
pub fn restart_transport_timeout(grace: Option<Duration>, base: Duration) -> Duration {
    grace.map_or(base, |g| g.saturating_add(RESTART_TRANSPORT_BUFFER))
}

/// A connection to one container runtime.
///
/// Safe to share between tasks; the runtime, socket and timeout are fixed at
/// construction. Call [`Client::close`] when done.
pub struct Client {
    backend: Arc<dyn Backend>,
    info: RuntimeInfo,
    endpoint: Endpoint,
    timeout: Duration,
    poll_interval: Duration,
    closed: AtomicBool,
    base: CancellationToken,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Client {
    /// Detect (or use the configured socket) and connect.
    pub async fn connect(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        let conn = detection::resolve(config).await?;
        Ok(Self::from_connection(conn, config.timeout))
    }

    pub(crate) fn from_connection(conn: Connection, timeout: Duration) -> Self {
        Self::from_parts(conn.backend, conn.info, timeout)
    }

    pub(crate) fn from_parts(
        backend: Arc<dyn Backend>,
        info: RuntimeInfo,
        timeout: Duration,
    ) -> Self {
        Self {
            endpoint: Endpoint::new(info.runtime_type, &info.socket_path),
            backend,
            info,
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
            closed: AtomicBool::new(false),
            base: CancellationToken::new(),
        }
    }

    /// Override the `running` wait poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn runtime_info(&self) -> &RuntimeInfo {
        &self.info
    }

    pub fn runtime(&self) -> RuntimeType {
        self.info.runtime_type
    }

    pub fn socket_path(&self) -> &Path {
        &self.info.socket_path
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Release the client. In-flight and later operations fail; calling again
    /// is a no-op.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.base.cancel();
            tracing::debug!(endpoint = %self.endpoint, "runtime client closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Round-trip to the runtime.
    pub async fn ping(&self, cancel: &CancellationToken) -> Result<(), RuntimeError> {
        self.run(cancel, "ping", "", self.timeout, self.backend.ping())
            .await
    }

    /// Create a container from `spec`. Ports, memory and volumes are validated before any
    /// runtime call; a name conflict is reported as `ContainerAlreadyExists`.
    pub async fn create(
        &self,
        cancel: &CancellationToken,
        spec: &ContainerSpec,
    ) -> Result<ContainerId, RuntimeError> {
        self.ensure_open()?;
        let body = translate(spec).map_err(|e| self.invalid_spec(e))?;

        tracing::debug!(name = %spec.name, image = %spec.image, "creating container");
        let id = self
            .run(
                cancel,
                "create",
                &spec.name,
                self.timeout,
                self.backend.create(&spec.name, body),
            )
            .await?;

        tracing::debug!(name = %spec.name, id = %id, "container created");
        Ok(ContainerId::new(id))
    }

    pub async fn start(
        &self,
        cancel: &CancellationToken,
        id: &ContainerId,
    ) -> Result<(), RuntimeError> {
        tracing::debug!(container = %id, "starting container");
        let backend = &self.backend;
        self.run(cancel, "start", id.as_str(), self.timeout, async {
            already_there(backend.start(id.as_str()).await)
        })
        .await
    }

    /// Stop a container, giving it `grace` to exit before it is killed.
    pub async fn stop(
        &self,
        cancel: &CancellationToken,
        id: &ContainerId,
        grace: Option<Duration>,
    ) -> Result<(), RuntimeError> {
        let transport = stop_transport_timeout(grace, self.timeout);
        tracing::debug!(container = %id, ?grace, ?transport, "stopping container");
        let backend = &self.backend;
        self.run(cancel, "stop", id.as_str(), transport, async {
            already_there(backend.stop(id.as_str(), grace, transport).await)
        })
        .await
    }

    pub async fn restart(
        &self,
        cancel: &CancellationToken,
        id: &ContainerId,
        grace: Option<Duration>,
    ) -> Result<(), RuntimeError> {
        let transport = restart_transport_timeout(grace, self.timeout);
        tracing::debug!(container = %id, ?grace, ?transport, "restarting container");
        self.run(
            cancel,
            "restart",
            id.as_str(),
            transport,
            self.backend.restart(id.as_str(), grace, transport),
        )
        .await
    }

    /// Remove a container. A running container needs `force`.
    pub async fn remove(
        &self,
        cancel: &CancellationToken,
        id: &ContainerId,
        opts: RemoveOptions,
    ) -> Result<(), RuntimeError> {
        tracing::debug!(container = %id, force = opts.force, volumes = opts.remove_volumes, "removing container");
        self.run(
            cancel,
            "remove",
            id.as_str(),
            self.timeout,
            self.backend.remove(id.as_str(), opts),
        )
        .await
    }

    pub async fn inspect(
        &self,
        cancel: &CancellationToken,
        id: &ContainerId,
    ) -> Result<ContainerState, RuntimeError> {
        tracing::debug!(container = %id, "inspecting container");
        self.run(
            cancel,
            "inspect",
            id.as_str(),
            self.timeout,
            self.backend.inspect(id.as_str()),
        )
        .await
    }

    /// Snapshot of containers matching `opts`.
    pub async fn list(
        &self,
        cancel: &CancellationToken,
        opts: &ListOptions,
    ) -> Result<Vec<ContainerState>, RuntimeError> {
        tracing::debug!(all = opts.all, limit = ?opts.limit, labels = opts.labels.len(), "listing containers");
        let mut containers = self
            .run(cancel, "list", "", self.timeout, self.backend.list(opts))
            .await?;
        if let Some(limit) = opts.limit {
            containers.truncate(limit);
        }
        Ok(containers)
    }

    /// Block until `id` reaches `condition` (`running`, `not-running` or
    /// `removed`), bounded by the client timeout.
    ///
    /// Unknown conditions are rejected before contacting the runtime.
    pub async fn wait_for_condition(
        &self,
        cancel: &CancellationToken,
        id: &ContainerId,
        condition: &str,
    ) -> Result<(), RuntimeError> {
        self.wait_for_condition_within(cancel, id, condition, self.timeout)
            .await
    }

    /// Like [`Client::wait_for_condition`] with an explicit bound.
    pub async fn wait_for_condition_within(
        &self,
        cancel: &CancellationToken,
        id: &ContainerId,
        condition: &str,
        within: Duration,
    ) -> Result<(), RuntimeError> {
        let condition: WaitCondition =
            condition
                .parse()
                .map_err(|source| RuntimeError::InvalidCondition {
                    endpoint: self.endpoint.clone(),
                    source,
                })?;
        self.wait_until(cancel, id, condition, within).await
    }

    /// Typed form of [`Client::wait_for_condition_within`].
    pub async fn wait_until(
        &self,
        cancel: &CancellationToken,
        id: &ContainerId,
        condition: WaitCondition,
        within: Duration,
    ) -> Result<(), RuntimeError> {
        tracing::debug!(container = %id, %condition, ?within, "waiting for container");
        match condition {
            WaitCondition::Running => self.poll_running(cancel, id, within).await,
            WaitCondition::NotRunning => {
                self.run(
                    cancel,
                    "wait",
                    id.as_str(),
                    within,
                    self.backend.wait(id.as_str(), condition, within),
                )
                .await
            }
            WaitCondition::Removed => {
                let backend = &self.backend;
                self.run(cancel, "wait", id.as_str(), within, async {
                    match backend.wait(id.as_str(), condition, within).await {
                        // Already gone.
                        Err(BackendError::NotFound(_)) => Ok(()),
                        other => other,
                    }
                })
                .await
            }
        }
    }

    /// Inspect every poll interval until the container reports `running`.
    /// Cancellation is observed between probes, never mid-probe.
    async fn poll_running(
        &self,
        cancel: &CancellationToken,
        id: &ContainerId,
        within: Duration,
    ) -> Result<(), RuntimeError> {
        let token = cancel.child_token();
        let deadline = Instant::now() + within;

        loop {
            if token.is_cancelled() {
                return Err(self.cancelled("wait"));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(self.timed_out("wait", within));
            }

            let state = self
                .bounded("wait", id.as_str(), remaining, self.backend.inspect(id.as_str()))
                .await?;
            if state.status.is_running() {
                return Ok(());
            }
            tracing::trace!(container = %id, status = %state.status, "not running yet");

            let next = (Instant::now() + self.poll_interval).min(deadline);
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(self.cancelled("wait")),
                _ = self.base.cancelled() => self.ensure_open()?,
                _ = tokio::time::sleep_until(next) => {}
            }
        }
    }

    /// Run `fut` under the caller's cancellation, the client's own lifetime
    /// and a `limit` timeout.
    async fn run<T, F>(
        &self,
        cancel: &CancellationToken,
        operation: &'static str,
        subject: &str,
        limit: Duration,
        fut: F,
    ) -> Result<T, RuntimeError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        let token = cancel.child_token();
        if token.is_cancelled() {
            return Err(self.cancelled(operation));
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(self.cancelled(operation)),
            _ = self.base.cancelled() => Err(RuntimeError::Closed {
                endpoint: self.endpoint.clone(),
            }),
            result = self.bounded(operation, subject, limit, fut) => result,
        }
    }

    /// Run `fut` under a `limit` timeout only.
    async fn bounded<T, F>(
        &self,
        operation: &'static str,
        subject: &str,
        limit: Duration,
        fut: F,
    ) -> Result<T, RuntimeError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        self.ensure_open()?;
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result.map_err(|e| self.lift(operation, subject, e)),
            Err(_) => Err(self.timed_out(operation, limit)),
        }
    }

    fn ensure_open(&self) -> Result<(), RuntimeError> {
        if self.is_closed() {
            return Err(RuntimeError::Closed {
                endpoint: self.endpoint.clone(),
            });
        }
        Ok(())
    }

    fn cancelled(&self, operation: &'static str) -> RuntimeError {
        RuntimeError::Cancelled {
            endpoint: self.endpoint.clone(),
            operation,
        }
    }

    fn timed_out(&self, operation: &'static str, after: Duration) -> RuntimeError {
        RuntimeError::Timeout {
            endpoint: self.endpoint.clone(),
            operation,
            after,
        }
    }

    fn invalid_spec(&self, err: TranslateError) -> RuntimeError {
        let endpoint = self.endpoint.clone();
        match err {
            TranslateError::InvalidPort { side, port } => RuntimeError::InvalidPort {
                endpoint,
                side,
                port,
            },
            TranslateError::InvalidMemory(source) => {
                RuntimeError::InvalidMemoryFormat { endpoint, source }
            }
            TranslateError::InvalidVolume { entry, reason } => RuntimeError::InvalidVolume {
                endpoint,
                entry,
                reason,
            },
        }
    }

    /// Attach endpoint context to a classified backend failure.
    fn lift(&self, operation: &'static str, subject: &str, err: BackendError) -> RuntimeError {
        let endpoint = self.endpoint.clone();
        match err {
            BackendError::NotFound(_) => RuntimeError::ContainerNotFound {
                endpoint,
                container: subject.to_string(),
            },
            BackendError::AlreadyExists(_) => RuntimeError::ContainerAlreadyExists {
                endpoint,
                name: subject.to_string(),
            },
            BackendError::Unreachable(message) => {
                RuntimeError::DaemonNotRunning { endpoint, message }
            }
            BackendError::ApiVersion(message) => {
                RuntimeError::ApiVersionMismatch { endpoint, message }
            }
            BackendError::PermissionDenied(message) => RuntimeError::PermissionDenied {
                endpoint,
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, message),
            },
            BackendError::NotModified(message) | BackendError::Other(message) => {
                RuntimeError::Backend {
                    endpoint,
                    operation,
                    message,
                }
            }
        }
    }
}

/// Starting a running container or stopping a stopped one is a no-op.
fn already_there(result: Result<(), BackendError>) -> Result<(), BackendError> {
    match result {
        Err(BackendError::NotModified(_)) => Ok(()),
        other => other,
    }
}
