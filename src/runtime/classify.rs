// ABOUTME: Maps opaque backend failures onto a small closed set of outcomes.
// ABOUTME: Status codes are consulted first, then per-backend message vocabulary.

/// A classified backend failure, before runtime/socket context is attached.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum BackendError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    /// 304: the container is already in the requested state.
    #[error("{0}")]
    NotModified(String),

    #[error("{0}")]
    Unreachable(String),

    #[error("{0}")]
    ApiVersion(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0}")]
    Other(String),
}

/// What the failing request addressed. A 404 on a container path always
/// means the container is gone; on create it means the image is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    Container,
    Create,
    Daemon,
}

/// Phrases a runtime uses in error bodies.
#[derive(Debug)]
pub(crate) struct Vocabulary {
    pub not_found: &'static [&'static str],
    pub conflict: &'static [&'static str],
}

pub(crate) const DOCKER: Vocabulary = Vocabulary {
    not_found: &["no such container", "could not find container"],
    conflict: &["is already in use"],
};

pub(crate) const PODMAN: Vocabulary = Vocabulary {
    not_found: &["no such container", "no container with name or id"],
    conflict: &["is already in use", "name is in use"],
};

const UNREACHABLE: &[&str] = &[
    "connection refused",
    "timed out",
    "timeout",
    "connection reset",
    "broken pipe",
    "no such file or directory",
];

const API_VERSION: &[&str] = &["client version", "api version", "minimum supported api"];

impl Vocabulary {
    /// Classify a bollard error from a request in `scope`.
    pub(crate) fn classify(&self, err: &bollard::errors::Error, scope: Scope) -> BackendError {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code,
                message,
            } => self.classify_response(Some(*status_code), message, scope),
            bollard::errors::Error::RequestTimeoutError => {
                BackendError::Unreachable(err.to_string())
            }
            _ => self.classify_response(None, &error_chain(err), scope),
        }
    }

    /// Classify a status code (if the runtime answered) and message text.
    pub(crate) fn classify_response(
        &self,
        status: Option<u16>,
        message: &str,
        scope: Scope,
    ) -> BackendError {
        let lower = message.to_ascii_lowercase();
        let message = message.to_string();

        if contains_any(&lower, self.not_found)
            || (status == Some(404) && scope == Scope::Container)
        {
            return BackendError::NotFound(message);
        }
        if contains_any(&lower, self.conflict) {
            return BackendError::AlreadyExists(message);
        }
        if status == Some(304) {
            return BackendError::NotModified(message);
        }
        if contains_any(&lower, API_VERSION) {
            return BackendError::ApiVersion(message);
        }
        if status.is_none() {
            if lower.contains("permission denied") {
                return BackendError::PermissionDenied(message);
            }
            if contains_any(&lower, UNREACHABLE) {
                return BackendError::Unreachable(message);
            }
        }
        BackendError::Other(message)
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Display of an error and all its sources. Hyper hides the cause
/// (e.g. `ECONNREFUSED`) behind a generic top-level message.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !out.contains(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = cause.source();
    }
    out
}
