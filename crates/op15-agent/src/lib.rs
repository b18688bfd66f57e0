pub mod client;
pub mod config;
pub mod dispatch;
pub mod http;
pub mod reconnect;
pub mod state;

pub use config::AgentConfig;
pub use state::AgentState;
