// ABOUTME: Translates a backend-agnostic ContainerSpec into the creation payload.
// ABOUTME: Validates ports, memory, and volumes before any runtime call.

use super::container::ContainerSpec;
use super::error::PortSide;
use crate::types::{MemoryLimit, ParseMemoryError};
use bollard::models::{ContainerCreateBody, HostConfig, Mount, MountTypeEnum, PortBinding};
use std::collections::HashMap;
use std::path::Path;

/// CFS period the CPU quota is expressed against, in microseconds.
pub const CPU_PERIOD_MICROS: i64 = 100_000;

/// A spec rejected before reaching the runtime.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslateError {
    #[error("invalid {side} port {port} (must be 1-65535)")]
    InvalidPort { side: PortSide, port: u32 },

    #[error(transparent)]
    InvalidMemory(#[from] ParseMemoryError),

    #[error("invalid volume {entry:?}: {reason}")]
    InvalidVolume { entry: String, reason: &'static str },
}

/// A parsed volume entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
    pub named: bool,
}

/// Build the Docker-compatible creation body for `spec`.
///
/// Ports are checked first so an out-of-range port is reported even when
/// other fields are also invalid.
pub fn translate(spec: &ContainerSpec) -> Result<ContainerCreateBody, TranslateError> {
    let ports = validate_ports(spec)?;
    let memory = spec.memory.as_deref().map(memory_bytes).transpose()?;
    let mounts = spec
        .volumes
        .iter()
        .map(|(source, target)| parse_volume(source, target))
        .collect::<Result<Vec<_>, _>>()?;

    let mut host_config = HostConfig::default();

    host_config.memory = memory;
    if let Some(quota) = spec.cpu_quota.filter(|q| *q > 0) {
        host_config.cpu_quota = Some(quota);
        host_config.cpu_period = Some(CPU_PERIOD_MICROS);
    }

    let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
    let mut exposed_ports: Vec<String> = Vec::new();
    for (host, container) in ports {
        let key = format!("{container}/tcp");
        if !exposed_ports.contains(&key) {
            exposed_ports.push(key.clone());
        }
        port_bindings
            .entry(key)
            .or_insert_with(|| Some(Vec::new()))
            .get_or_insert_with(Vec::new)
            .push(PortBinding {
                host_ip: None,
                host_port: Some(host.to_string()),
            });
    }
    if !port_bindings.is_empty() {
        host_config.port_bindings = Some(port_bindings);
    }

    if !mounts.is_empty() {
        host_config.mounts = Some(
            mounts
                .into_iter()
                .map(|m| Mount {
                    source: Some(m.source),
                    target: Some(m.target),
                    typ: Some(if m.named {
                        MountTypeEnum::VOLUME
                    } else {
                        MountTypeEnum::BIND
                    }),
                    read_only: Some(m.read_only),
                    ..Default::default()
                })
                .collect(),
        );
    }

    let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();

    Ok(ContainerCreateBody {
        image: Some(spec.image.clone()),
        env: (!env.is_empty()).then_some(env),
        labels: (!spec.labels.is_empty())
            .then(|| spec.labels.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        cmd: (!spec.command.is_empty()).then(|| spec.command.clone()),
        working_dir: spec.working_dir.clone(),
        exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
        host_config: Some(host_config),
        ..Default::default()
    })
}

fn memory_bytes(raw: &str) -> Result<i64, TranslateError> {
    let limit = MemoryLimit::parse(raw)?;
    i64::try_from(limit.bytes()).map_err(|_| {
        TranslateError::InvalidMemory(ParseMemoryError {
            value: raw.to_string(),
        })
    })
}

fn validate_ports(spec: &ContainerSpec) -> Result<Vec<(u16, u16)>, TranslateError> {
    spec.ports
        .iter()
        .map(|(&host, &container)| {
            Ok((
                checked_port(host, PortSide::Host)?,
                checked_port(container, PortSide::Container)?,
            ))
        })
        .collect()
}

fn checked_port(port: u32, side: PortSide) -> Result<u16, TranslateError> {
    u16::try_from(port)
        .ok()
        .filter(|p| *p >= 1)
        .ok_or(TranslateError::InvalidPort { side, port })
}

/// Split `target` on a trailing `:ro` / `:rw`. No suffix means read-write.
pub fn parse_volume(source: &str, target: &str) -> Result<VolumeMount, TranslateError> {
    let invalid = |reason| TranslateError::InvalidVolume {
        entry: format!("{source}:{target}"),
        reason,
    };

    let (path, read_only) = if let Some(path) = target.strip_suffix(":ro") {
        (path, true)
    } else if let Some(path) = target.strip_suffix(":rw") {
        (path, false)
    } else {
        (target, false)
    };

    if source.is_empty() {
        return Err(invalid("empty source"));
    }
    if !path.starts_with('/') {
        return Err(invalid("container path must be absolute"));
    }

    let named = !source.starts_with('/') && !source.starts_with('.');
    let source = if source.starts_with('.') {
        std::path::absolute(Path::new(source))
            .map_err(|_| invalid("cannot resolve relative host path"))?
            .to_string_lossy()
            .into_owned()
    } else {
        source.to_string()
    };

    Ok(VolumeMount {
        source,
        target: path.to_string(),
        read_only,
        named,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ContainerSpec {
        let mut spec = ContainerSpec::new("mc-survival", "itzg/minecraft-server:java21");
        spec.env.insert("EULA".into(), "TRUE".into());
        spec.ports.insert(25565, 25565);
        spec.volumes
            .insert("/srv/mc/survival".into(), "/data".into());
        spec.memory = Some("2G".into());
        spec.labels.insert("managed-by".into(), "berth".into());
        spec
    }

    #[test]
    fn translates_full_spec() {
        let body = translate(&spec()).unwrap();
        let host = body.host_config.unwrap();

        assert_eq!(body.image.as_deref(), Some("itzg/minecraft-server:java21"));
        assert_eq!(body.env, Some(vec!["EULA=TRUE".to_string()]));
        assert_eq!(host.memory, Some(2 * 1024 * 1024 * 1024));
        assert_eq!(body.exposed_ports, Some(vec!["25565/tcp".to_string()]));

        let bindings = host.port_bindings.unwrap();
        let binding = bindings["25565/tcp"].as_ref().unwrap();
        assert_eq!(binding[0].host_port.as_deref(), Some("25565"));

        let mounts = host.mounts.unwrap();
        assert_eq!(mounts[0].typ, Some(MountTypeEnum::BIND));
        assert_eq!(mounts[0].read_only, Some(false));
        assert_eq!(body.labels.unwrap()["managed-by"], "berth");
        assert!(body.cmd.is_none());
    }

    #[test]
    fn rejects_out_of_range_ports_naming_the_side() {
        let mut s = spec();
        s.ports.insert(0, 25565);
        assert_eq!(
            translate(&s).unwrap_err(),
            TranslateError::InvalidPort {
                side: PortSide::Host,
                port: 0
            }
        );

        let mut s = spec();
        s.ports.insert(25566, 70000);
        assert_eq!(
            translate(&s).unwrap_err(),
            TranslateError::InvalidPort {
                side: PortSide::Container,
                port: 70000
            }
        );
    }

    #[test]
    fn port_error_wins_over_memory_error() {
        let mut s = spec();
        s.memory = Some("lots".into());
        s.ports.insert(65536, 80);
        assert!(matches!(
            translate(&s),
            Err(TranslateError::InvalidPort { port: 65536, .. })
        ));
    }

    #[test]
    fn invalid_memory_names_the_value() {
        let mut s = spec();
        s.memory = Some("2X".into());
        let err = translate(&s).unwrap_err();
        assert!(err.to_string().contains("2X"));
        assert!(matches!(err, TranslateError::InvalidMemory(_)));
    }

    #[test]
    fn oversized_memory_is_rejected_not_wrapped() {
        let mut s = spec();
        s.memory = Some("9000000000G".into());
        let err = translate(&s).unwrap_err();
        assert!(err.to_string().contains("9000000000G"));
        assert!(matches!(err, TranslateError::InvalidMemory(_)));

        s.memory = Some("9223372036854775807".into());
        let host = translate(&s).unwrap().host_config.unwrap();
        assert_eq!(host.memory, Some(i64::MAX));
    }

    #[test]
    fn cpu_quota_only_when_positive() {
        let mut s = spec();
        s.cpu_quota = Some(150_000);
        let host = translate(&s).unwrap().host_config.unwrap();
        assert_eq!(host.cpu_quota, Some(150_000));
        assert_eq!(host.cpu_period, Some(CPU_PERIOD_MICROS));

        s.cpu_quota = Some(0);
        let host = translate(&s).unwrap().host_config.unwrap();
        assert_eq!(host.cpu_quota, None);
    }

    #[test]
    fn volume_mode_suffixes() {
        let ro = parse_volume("/srv/mods", "/mods:ro").unwrap();
        assert!(ro.read_only);
        assert_eq!(ro.target, "/mods");

        let rw = parse_volume("/srv/data", "/data:rw").unwrap();
        assert!(!rw.read_only);
        assert_eq!(rw.target, "/data");

        let default = parse_volume("/srv/data", "/data").unwrap();
        assert!(!default.read_only);
    }

    #[test]
    fn named_volumes_and_bad_targets() {
        let named = parse_volume("mc-world", "/data").unwrap();
        assert!(named.named);

        let relative = parse_volume("./world", "/data").unwrap();
        assert!(!relative.named);
        assert!(relative.source.starts_with('/'));

        assert!(parse_volume("/srv", "data").is_err());
        assert!(parse_volume("", "/data").is_err());
    }

    #[test]
    fn several_host_ports_to_one_container_port() {
        let mut s = ContainerSpec::new("mc", "img");
        s.ports.insert(25565, 25565);
        s.ports.insert(25575, 25565);
        let host = translate(&s).unwrap().host_config.unwrap();
        let bindings = host.port_bindings.unwrap();
        assert_eq!(bindings["25565/tcp"].as_ref().unwrap().len(), 2);
    }
}
