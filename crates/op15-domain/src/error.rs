//! Shared error taxonomy for the bridge and the agent daemon.
//!
//! Every variant here corresponds to one row of the error-kind table: the
//! `kind()` string is what crosses the wire verbatim in a Response's
//! `error` field, or is surfaced to a loopback HTTP caller.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Why the Permission Core denied a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DenyReason {
    Capability,
    Scope,
    PlanViolation,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::Capability => write!(f, "capability"),
            DenyReason::Scope => write!(f, "scope"),
            DenyReason::PlanViolation => write!(f, "plan-violation"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("agent-not-connected: {0}")]
    AgentNotConnected(String),
    #[error("agent-disconnected: {0}")]
    AgentDisconnected(String),
    #[error("agent-unreachable: {0}")]
    AgentUnreachable(String),
    #[error("agent-backpressure")]
    AgentBackpressure,
    #[error("permission-denied: {reason}")]
    PermissionDenied { reason: DenyReason },
    #[error("plan-violation")]
    PlanViolation,

    #[error("not-found: {0}")]
    NotFound(String),
    #[error("is-a-directory: {0}")]
    IsADirectory(String),
    #[error("not-a-directory: {0}")]
    NotADirectory(String),
    #[error("not-empty: {0}")]
    NotEmpty(String),
    #[error("cross-device: {0}")]
    CrossDevice(String),
    #[error("invalid-cwd: {0}")]
    InvalidCwd(String),
    #[error("too-large: {0}")]
    TooLarge(String),

    #[error("timeout")]
    Timeout,
    #[error("unknown-operation: {0}")]
    UnknownOperation(String),
    #[error("malformed-frame: {0}")]
    MalformedFrame(String),
    #[error("forbidden")]
    Forbidden,

    #[error("io: {0}")]
    Io(String),
    #[error("json: {0}")]
    Json(String),
    #[error("config: {0}")]
    Config(String),
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The stable kind string that crosses the wire / HTTP boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::AgentNotConnected(_) => "agent-not-connected",
            Error::AgentDisconnected(_) => "agent-disconnected",
            Error::AgentUnreachable(_) => "agent-unreachable",
            Error::AgentBackpressure => "agent-backpressure",
            Error::PermissionDenied { .. } => "permission-denied",
            Error::PlanViolation => "plan-violation",
            Error::NotFound(_) => "not-found",
            Error::IsADirectory(_) => "is-a-directory",
            Error::NotADirectory(_) => "not-a-directory",
            Error::NotEmpty(_) => "not-empty",
            Error::CrossDevice(_) => "cross-device",
            Error::InvalidCwd(_) => "invalid-cwd",
            Error::TooLarge(_) => "too-large",
            Error::Timeout => "timeout",
            Error::UnknownOperation(_) => "unknown-operation",
            Error::MalformedFrame(_) => "malformed-frame",
            Error::Forbidden => "forbidden",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Config(_) => "config",
            Error::Other(_) => "other",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_match_table() {
        assert_eq!(Error::AgentBackpressure.kind(), "agent-backpressure");
        assert_eq!(
            Error::PermissionDenied {
                reason: DenyReason::Scope
            }
            .kind(),
            "permission-denied"
        );
        assert_eq!(Error::Forbidden.kind(), "forbidden");
    }

    #[test]
    fn deny_reason_displays_kebab() {
        assert_eq!(DenyReason::PlanViolation.to_string(), "plan-violation");
    }
}
