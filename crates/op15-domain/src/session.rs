//! The portable (transport-agnostic) half of an Agent Session.
//!
//! The outgoing channel handle itself is transport-specific and is not
//! modeled here; `op15-bridge` wraps [`AgentSessionInfo`] together with its
//! `mpsc::Sender` and connection lifecycle state.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fsindex::FsIndex;
use crate::permissions::SessionPermissions;

pub type UserId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Darwin,
    Windows,
}

impl Platform {
    /// Detect the platform of the process the daemon runs on.
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::Darwin
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }
}

/// A 128-bit opaque token generated at install, bound to (user, binary).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedSecret(pub String);

impl SharedSecret {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The data attached to an Agent Session, independent of transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSessionInfo {
    pub user_id: UserId,
    pub connected_at: DateTime<Utc>,
    pub home_directory: PathBuf,
    pub platform: Platform,
    pub loopback_endpoint: Option<String>,
    #[serde(skip_serializing)]
    pub shared_secret: SharedSecret,
    pub filesystem_index: FsIndex,
    pub permissions: SessionPermissions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_platform_is_one_of_the_three() {
        let p = Platform::current();
        assert!(matches!(p, Platform::Linux | Platform::Darwin | Platform::Windows));
    }
}
