//! Bridge Manager, Transport Dispatcher, Tool Surface, and
//! the cloud half of Session Lifecycle — the process that maintains
//! long-lived agent channels and exposes the six tool-call entry points
//! to whatever orchestrator sits above it.

pub mod config;
pub mod pending;
pub mod permission_ack;
pub mod registry;
pub mod session;
pub mod state;
pub mod tool_surface;
pub mod transport;
pub mod ws;

pub use config::BridgeConfig;
pub use state::AppState;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

/// Build the axum router: the agent-facing WS upgrade route plus
/// whatever plain HTTP routes an orchestrator needs for health checks.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/bridge", get(ws::bridge_ws))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
