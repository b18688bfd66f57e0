//! Shared agent-process state: the daemon's own session info/permissions
//! and the outgoing channel handle, reachable from both the HTTP
//! listener and the upstream channel reader task.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use op15_domain::action_log::ActionLog;
use op15_domain::fsindex::FsIndex;
use op15_domain::permissions::SessionPermissions;
use op15_domain::session::{Platform, SharedSecret, UserId};

use crate::config::AgentConfig;

#[derive(Debug, Clone)]
pub struct DaemonSessionInfo {
    pub home_directory: std::path::PathBuf,
    pub platform: Platform,
    pub filesystem_index: FsIndex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Clone)]
pub struct AgentState {
    pub user_id: UserId,
    pub shared_secret: SharedSecret,
    pub session_info: Arc<RwLock<DaemonSessionInfo>>,
    pub permissions: Arc<RwLock<SessionPermissions>>,
    pub action_log: Arc<ActionLog>,
    pub connectivity: Arc<RwLock<ConnectivityState>>,
    /// Outbound frames the upstream channel writer task drains; `None`
    /// once the channel client hasn't connected yet.
    pub upstream_tx: Arc<RwLock<Option<mpsc::Sender<String>>>>,
    pub shutdown: Arc<tokio_util::sync::CancellationToken>,
}

impl AgentState {
    pub fn new(config: &AgentConfig, home_directory: std::path::PathBuf) -> Self {
        let filesystem_index = FsIndex::build(&home_directory);
        Self {
            user_id: config.user_id.clone(),
            shared_secret: SharedSecret(config.shared_secret.clone()),
            session_info: Arc::new(RwLock::new(DaemonSessionInfo {
                home_directory,
                platform: Platform::current(),
                filesystem_index,
            })),
            permissions: Arc::new(RwLock::new(SessionPermissions::default())),
            action_log: Arc::new(ActionLog::new()),
            connectivity: Arc::new(RwLock::new(ConnectivityState::Connecting)),
            upstream_tx: Arc::new(RwLock::new(None)),
            shutdown: Arc::new(tokio_util::sync::CancellationToken::new()),
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.connectivity.read() == ConnectivityState::Connected
    }

    pub fn set_connectivity(&self, state: ConnectivityState) {
        *self.connectivity.write() = state;
    }

    pub fn secret_matches(&self, provided: &str) -> bool {
        token_eq(provided, self.shared_secret.as_str())
    }
}

/// Constant-time token comparison via SHA-256 digest, grounded in the
/// teacher's `nodes::ws::token_eq`.
fn token_eq(a: &str, b: &str) -> bool {
    use sha2::{Digest, Sha256};
    use subtle::ConstantTimeEq;
    let ha = Sha256::digest(a.as_bytes());
    let hb = Sha256::digest(b.as_bytes());
    ha.ct_eq(&hb).into()
}
