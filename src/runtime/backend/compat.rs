// ABOUTME: Docker-compatible API calls shared by both runtime variants.
// ABOUTME: Wraps bollard and classifies every failure with the caller's vocabulary.

use super::{VersionInfo, host_port, into_btree, port_from_key, status_text};
use crate::runtime::classify::{BackendError, Scope, Vocabulary};
use crate::runtime::container::{ContainerState, ContainerStatus, ListOptions, RemoveOptions};
use crate::types::{ContainerId, WaitCondition};
use bollard::Docker;
use bollard::models::ContainerCreateBody;
use bollard::query_parameters::{
    CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, RestartContainerOptions, StartContainerOptions, StopContainerOptions,
    WaitContainerOptions,
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

/// A bollard client bound to one socket plus the vocabulary of its runtime.
pub(crate) struct Compat {
    docker: Docker,
    vocab: &'static Vocabulary,
}

impl Compat {
    pub(crate) fn open(
        socket: &Path,
        timeout: Duration,
        vocab: &'static Vocabulary,
    ) -> Result<Self, BackendError> {
        let path = socket.to_string_lossy();
        let docker =
            Docker::connect_with_unix(&path, timeout.as_secs().max(1), bollard::API_DEFAULT_VERSION)
                .map_err(|e| vocab.classify(&e, Scope::Daemon))?;
        Ok(Self { docker, vocab })
    }

    fn classify(&self, scope: Scope) -> impl Fn(bollard::errors::Error) -> BackendError + '_ {
        move |e| self.vocab.classify(&e, scope)
    }

    /// Client whose per-request timeout is at least `transport`.
    fn with_transport(&self, transport: Duration) -> Docker {
        self.docker
            .clone()
            .with_timeout(transport.max(Duration::from_secs(1)))
    }

    pub(crate) async fn version(&self) -> Result<VersionInfo, BackendError> {
        let version = self
            .docker
            .version()
            .await
            .map_err(self.classify(Scope::Daemon))?;

        Ok(VersionInfo {
            version: version.version.unwrap_or_default(),
            api_version: version.api_version.unwrap_or_default(),
            os: version.os.unwrap_or_default(),
            arch: version.arch.unwrap_or_default(),
            rootless: None,
        })
    }

    /// Security options from `/info`; contains `name=rootless` for rootless daemons.
    pub(crate) async fn security_options(&self) -> Result<Vec<String>, BackendError> {
        let info = self
            .docker
            .info()
            .await
            .map_err(self.classify(Scope::Daemon))?;
        Ok(info.security_options.unwrap_or_default())
    }

    pub(crate) async fn ping(&self) -> Result<(), BackendError> {
        self.docker
            .ping()
            .await
            .map_err(self.classify(Scope::Daemon))?;
        Ok(())
    }

    pub(crate) async fn create(
        &self,
        name: &str,
        body: ContainerCreateBody,
    ) -> Result<String, BackendError> {
        let opts = CreateContainerOptions {
            name: Some(name.to_string()),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(opts), body)
            .await
            .map_err(self.classify(Scope::Create))?;

        for warning in &response.warnings {
            tracing::warn!(container = name, "runtime warning: {}", warning);
        }

        Ok(response.id)
    }

    pub(crate) async fn start(&self, id: &str) -> Result<(), BackendError> {
        self.docker
            .start_container(id, None::<StartContainerOptions>)
            .await
            .map_err(self.classify(Scope::Container))
    }

    pub(crate) async fn stop(
        &self,
        id: &str,
        grace: Option<Duration>,
        transport: Duration,
    ) -> Result<(), BackendError> {
        let opts = StopContainerOptions {
            t: grace.map(grace_secs),
            signal: None,
        };

        self.with_transport(transport)
            .stop_container(id, Some(opts))
            .await
            .map_err(self.classify(Scope::Container))
    }

    pub(crate) async fn restart(
        &self,
        id: &str,
        grace: Option<Duration>,
        transport: Duration,
    ) -> Result<(), BackendError> {
        let opts = RestartContainerOptions {
            t: grace.map(grace_secs),
            signal: None,
        };

        self.with_transport(transport)
            .restart_container(id, Some(opts))
            .await
            .map_err(self.classify(Scope::Container))
    }

    pub(crate) async fn remove(&self, id: &str, opts: RemoveOptions) -> Result<(), BackendError> {
        let opts = RemoveContainerOptions {
            force: opts.force,
            v: opts.remove_volumes,
            ..Default::default()
        };

        self.docker
            .remove_container(id, Some(opts))
            .await
            .map_err(self.classify(Scope::Container))
    }

    pub(crate) async fn wait(
        &self,
        id: &str,
        condition: WaitCondition,
        transport: Duration,
    ) -> Result<(), BackendError> {
        let opts = WaitContainerOptions {
            condition: condition.as_str().to_string(),
        };

        let client = self.with_transport(transport);
        let mut stream = client.wait_container(id, Some(opts));
        while let Some(item) = stream.next().await {
            match item {
                Ok(_) => {}
                // A non-zero exit code still means the condition was reached.
                Err(bollard::errors::Error::DockerContainerWaitError { code, .. }) => {
                    tracing::debug!(container = id, exit_code = code, "container exited non-zero");
                }
                Err(e) => return Err(self.vocab.classify(&e, Scope::Container)),
            }
        }
        Ok(())
    }

    pub(crate) async fn inspect(&self, id: &str) -> Result<ContainerState, BackendError> {
        let details = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(self.classify(Scope::Container))?;

        let state = details.state.as_ref();
        let status = state
            .and_then(|s| s.status)
            .map(|s| ContainerStatus::parse(&format!("{:?}", s)))
            .unwrap_or(ContainerStatus::Unknown);
        let started_at = state.and_then(|s| s.started_at.clone());
        let exit_code = state.and_then(|s| s.exit_code);

        let mut ports = BTreeMap::new();
        if let Some(bindings) = details
            .network_settings
            .as_ref()
            .and_then(|n| n.ports.as_ref())
        {
            for (key, published) in bindings {
                let Some(container_port) = port_from_key(key) else {
                    tracing::debug!(container = id, key = %key, "skipping malformed port key");
                    continue;
                };
                for binding in published.iter().flatten() {
                    if let Some(host) = binding.host_port.as_deref().and_then(host_port) {
                        ports.insert(host, container_port);
                    }
                }
            }
        }

        let created = details
            .created
            .as_ref()
            .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), 0));

        Ok(ContainerState {
            id: ContainerId::new(details.id.clone().unwrap_or_else(|| id.to_string())),
            name: details
                .name
                .clone()
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_string(),
            status,
            status_text: status_text(status, started_at.as_deref(), exit_code),
            image: details
                .config
                .as_ref()
                .and_then(|c| c.image.clone())
                .unwrap_or_default(),
            ports,
            created,
            labels: into_btree(details.config.and_then(|c| c.labels).unwrap_or_default()),
        })
    }

    pub(crate) async fn list(&self, opts: &ListOptions) -> Result<Vec<ContainerState>, BackendError> {
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        for (key, value) in &opts.labels {
            filters
                .entry("label".to_string())
                .or_default()
                .push(format!("{key}={value}"));
        }

        let opts = ListContainersOptions {
            all: opts.all,
            limit: opts.limit.map(|l| l.min(i32::MAX as usize) as i32),
            filters: (!filters.is_empty()).then_some(filters),
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(opts))
            .await
            .map_err(self.classify(Scope::Daemon))?;

        Ok(containers
            .into_iter()
            .map(|c| {
                let name = c
                    .names
                    .as_ref()
                    .and_then(|names| names.first())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default();

                let status = c
                    .state
                    .map(|s| ContainerStatus::parse(&format!("{:?}", s)))
                    .unwrap_or(ContainerStatus::Unknown);

                let mut ports = BTreeMap::new();
                for port in c.ports.iter().flatten() {
                    if let Some(host) = port.public_port.filter(|p| *p > 0)
                        && port.private_port > 0
                    {
                        ports.insert(host, port.private_port);
                    }
                }

                ContainerState {
                    id: ContainerId::new(c.id.unwrap_or_default()),
                    name,
                    status,
                    status_text: c
                        .status
                        .filter(|s| !s.is_empty())
                        .unwrap_or_else(|| status_text(status, None, None)),
                    image: c.image.unwrap_or_default(),
                    ports,
                    created: c.created.and_then(|secs| DateTime::from_timestamp(secs, 0)),
                    labels: into_btree(c.labels.unwrap_or_default()),
                }
            })
            .collect())
    }
}

fn grace_secs(grace: Duration) -> i32 {
    grace.as_secs().min(i32::MAX as u64) as i32
}
