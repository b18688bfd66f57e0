use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

use op15_bridge::{router, AppState, BridgeConfig};
use op15_domain::config::report_issues;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("op15_bridge=info,tower_http=info")),
        )
        .json()
        .init();

    tracing::info!("bridge starting");

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("bridge.json"));
    let config = BridgeConfig::load_or_default(&config_path);

    if report_issues(&config.validate()) {
        anyhow::bail!("invalid bridge configuration, aborting startup");
    }

    let addr = config.socket_addr()?;
    let state = AppState::new(config);
    let app = router(state);

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
