//! Shared config-validation plumbing.
//!
//! Both binaries (`op15-agent`, `op15-bridge`) load a small JSON config
//! file adjacent to the executable and validate it at startup, in the
//! teacher's `Config::validate() -> Vec<ConfigIssue>` style rather than
//! failing on the first problem.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            ConfigSeverity::Warning => write!(f, "warning: {}", self.message),
            ConfigSeverity::Error => write!(f, "error: {}", self.message),
        }
    }
}

/// Log every issue via `tracing` at the appropriate level; returns `true`
/// iff at least one issue was an `Error` (callers typically abort startup).
pub fn report_issues(issues: &[ConfigIssue]) -> bool {
    let mut has_error = false;
    for issue in issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!(%issue, "config issue"),
            ConfigSeverity::Error => {
                has_error = true;
                tracing::error!(%issue, "config issue");
            }
        }
    }
    has_error
}
