// ABOUTME: Pure generators for actionable guidance attached to runtime errors.
// ABOUTME: Keyed on runtime and socket shape (rootless Podman, rootful Podman, Docker).

use super::types::{RuntimeMode, RuntimeType, SocketShape};
use std::path::Path;

pub fn daemon_not_running(shape: SocketShape) -> String {
    match shape {
        SocketShape::PodmanRootless => lines(&[
            "The rootless Podman API socket is not accepting connections.",
            "Start it for your user with:",
            "  systemctl --user enable --now podman.socket",
            "On servers without an interactive login session also run:",
            "  loginctl enable-linger \"$USER\"",
        ]),
        SocketShape::PodmanRootful => lines(&[
            "The system Podman API socket is not accepting connections.",
            "Start it with:",
            "  sudo systemctl enable --now podman.socket",
        ]),
        SocketShape::Docker => lines(&[
            "The Docker daemon is not running.",
            "Start it with:",
            "  sudo systemctl enable --now docker.service",
            "If Docker runs inside a desktop VM, start Docker Desktop instead.",
        ]),
    }
}

pub fn socket_not_found(shape: SocketShape, socket: &Path) -> String {
    let socket = socket.display();
    match shape {
        SocketShape::PodmanRootless => lines(&[
            &format!("No rootless Podman socket exists at {socket}."),
            "Install Podman (4.0 or newer) and enable the user socket:",
            "  systemctl --user enable --now podman.socket",
            "Check that XDG_RUNTIME_DIR points at /run/user/$(id -u).",
        ]),
        SocketShape::PodmanRootful => lines(&[
            &format!("No system Podman socket exists at {socket}."),
            "Install Podman (4.0 or newer) and enable the system socket:",
            "  sudo systemctl enable --now podman.socket",
        ]),
        SocketShape::Docker => lines(&[
            &format!("No Docker socket exists at {socket}."),
            "Install Docker Engine (https://docs.docker.com/engine/install/) and start it:",
            "  sudo systemctl enable --now docker.service",
        ]),
    }
}

pub fn permission_denied(shape: SocketShape, socket: &Path) -> String {
    let socket = socket.display();
    match shape {
        SocketShape::PodmanRootless => lines(&[
            &format!("{socket} belongs to another user's rootless Podman."),
            "Run as the user who owns the socket, or use your own:",
            "  systemctl --user enable --now podman.socket",
        ]),
        SocketShape::PodmanRootful => lines(&[
            &format!("{socket} is only accessible to root."),
            "Either run with sudo, or switch to rootless Podman:",
            "  systemctl --user enable --now podman.socket",
        ]),
        SocketShape::Docker => lines(&[
            &format!("Your user cannot access {socket}."),
            "Add yourself to the docker group, then log out and back in:",
            "  sudo usermod -aG docker \"$USER\"",
            "  newgrp docker",
        ]),
    }
}

pub fn api_version_mismatch(runtime: RuntimeType) -> String {
    match runtime {
        RuntimeType::Podman => lines(&[
            "The Podman API version is not supported.",
            "Upgrade to Podman 4.0 or newer; the Docker-compatible API is required.",
            "  podman version",
        ]),
        RuntimeType::Docker => lines(&[
            "The Docker API version is not supported.",
            "Upgrade Docker Engine to a current release:",
            "  docker version",
        ]),
    }
}

pub fn no_runtime_available(requested: RuntimeMode) -> String {
    let podman = [
        "Podman (recommended, rootless):",
        "  install the podman package for your distribution, then run",
        "  systemctl --user enable --now podman.socket",
    ];
    let docker = [
        "Docker:",
        "  install Docker Engine (https://docs.docker.com/engine/install/), then run",
        "  sudo systemctl enable --now docker.service",
        "  sudo usermod -aG docker \"$USER\"",
    ];
    let mut out = vec!["No usable container runtime socket was found."];
    match requested {
        RuntimeMode::Podman => out.extend(podman),
        RuntimeMode::Docker => out.extend(docker),
        RuntimeMode::Auto => {
            out.extend(podman);
            out.extend(docker);
        }
    }
    out.push("Or pass an explicit socket path if your runtime listens elsewhere.");
    lines(&out)
}

pub fn container_not_found(runtime: RuntimeType, container: &str) -> String {
    lines(&[
        &format!("The container {container} does not exist on {runtime}."),
        "It may have been removed outside this tool. List what exists with:",
        &format!("  {runtime} ps -a"),
    ])
}

pub fn container_already_exists(runtime: RuntimeType, name: &str) -> String {
    lines(&[
        &format!("A container named {name} already exists on {runtime}."),
        "Pick another name, or remove the old container first:",
        &format!("  {runtime} rm -f {name}"),
    ])
}

pub fn invalid_memory() -> String {
    lines(&[
        "Memory limits are a positive whole number with an optional unit:",
        "  K (kibibytes), M (mebibytes) or G (gibibytes), e.g. 512M or 2G.",
    ])
}

fn lines(parts: &[&str]) -> String {
    parts.join("\n")
}
