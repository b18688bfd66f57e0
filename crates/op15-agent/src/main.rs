use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use op15_agent::config::{default_config_path, AgentConfig};
use op15_agent::{client, http, AgentState};
use op15_domain::config::report_issues;

/// Local daemon bridging a user's machine to the cloud tool-calling channel.
#[derive(Debug, Parser)]
struct Cli {
    /// Overrides the configured server URL.
    server_url: Option<String>,
    /// Overrides the configured user id.
    user_id: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("op15_agent=info")))
        .json()
        .init();

    let cli = Cli::parse();

    let config = match AgentConfig::resolve(&default_config_path(), cli.server_url, cli.user_id) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to resolve agent configuration");
            std::process::exit(1);
        }
    };

    if report_issues(&config.validate()) {
        tracing::error!("invalid agent configuration, aborting startup");
        std::process::exit(1);
    }

    let home_directory = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let state = AgentState::new(&config, home_directory);

    tracing::info!(user_id = %state.user_id, server_url = %config.server_url, "agent starting");

    let http_state = state.clone();
    let loopback_addr = config.loopback_addr();
    let http_server = tokio::spawn(async move {
        let app = http::router(http_state);
        let listener = match tokio::net::TcpListener::bind(loopback_addr).await {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(error = %e, %loopback_addr, "failed to bind loopback listener");
                return;
            }
        };
        tracing::info!(%loopback_addr, "loopback listener bound");
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "loopback listener stopped");
        }
    });

    let exit = client::run(state, config).await;
    http_server.abort();

    match exit {
        client::UpstreamExit::Shutdown => std::process::exit(0),
        client::UpstreamExit::AuthRejected => std::process::exit(2),
    }
}
