//! Shared error type used across the orchestrator and ingress crates.
//!
//! Every variant maps to one of the error taxonomy kinds (validation,
//! policy, upstream, timeout, transport, internal) so HTTP/RPC boundaries
//! can map errors to status codes and wire error shapes in one place
//! instead of per-handler.

/// Coarse-grained error taxonomy kind. `kind()` picks the closest fit for
/// a given `Error` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Policy,
    Upstream,
    Timeout,
    Transport,
    Internal,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("policy: {0}")]
    Policy(String),

    #[error("upstream: {0}")]
    Upstream(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("transport: {0}")]
    Transport(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Policy(_) => ErrorKind::Policy,
            Error::Upstream(_) => ErrorKind::Upstream,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Io(_) | Error::Json(_) | Error::Config(_) | Error::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// The wire error `code` used in client/agent-facing error frames.
    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Validation => "invalid_message",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Policy => "policy",
            ErrorKind::Upstream => "orchestrator_fail",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Transport => "transport",
            ErrorKind::Internal => "internal_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
