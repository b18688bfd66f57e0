//! Shared application state passed to all axum handlers, grounded in the
//! teacher's `gateway::state::AppState` clone-of-Arcs pattern.

use std::sync::Arc;

use op15_domain::action_log::ActionLog;

use crate::config::BridgeConfig;
use crate::pending::PendingRegistry;
use crate::permission_ack::PermissionAckRegistry;
use crate::registry::SessionRegistry;
use crate::tool_surface::ToolSurface;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BridgeConfig>,
    pub registry: Arc<SessionRegistry>,
    pub pending: Arc<PendingRegistry>,
    pub permission_acks: Arc<PermissionAckRegistry>,
    pub action_log: Arc<ActionLog>,
    pub tool_surface: Arc<ToolSurface>,
}

impl AppState {
    pub fn new(config: BridgeConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let pending = Arc::new(PendingRegistry::new());
        let permission_acks = Arc::new(PermissionAckRegistry::new());
        let tool_surface = Arc::new(ToolSurface::new(registry.clone(), pending.clone(), permission_acks.clone()));
        Self {
            config: Arc::new(config),
            registry,
            pending,
            permission_acks,
            action_log: Arc::new(ActionLog::new()),
            tool_surface,
        }
    }
}
