//! Upstream channel client: dials the cloud, sends
//! `agent-metadata`, then runs the heartbeat + request dispatch loop
//! until the channel drops, reconnecting with backoff.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Semaphore};
use tokio_tungstenite::tungstenite::Message;

use op15_protocol::{ControlMessage, WireMessage};

use crate::config::AgentConfig;
use crate::dispatch::dispatch;
use crate::reconnect::ReconnectBackoff;
use crate::state::{AgentState, ConnectivityState};

const MAX_CONCURRENT_REQUESTS: usize = 16;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Exit reasons distinguished by the daemon's top-level CLI contract.
#[derive(Debug)]
pub enum UpstreamExit {
    Shutdown,
    AuthRejected,
}

/// Run the reconnect loop forever, until `state.shutdown` fires or the
/// upstream rejects authentication outright (HTTP 401/403 on upgrade).
pub async fn run(state: AgentState, config: AgentConfig) -> UpstreamExit {
    let backoff = ReconnectBackoff::default();
    let mut attempt: u32 = 0;

    loop {
        if state.shutdown.is_cancelled() {
            return UpstreamExit::Shutdown;
        }

        state.set_connectivity(ConnectivityState::Connecting);

        let result = tokio::select! {
            r = connect_and_run(&state, &config) => r,
            _ = state.shutdown.cancelled() => {
                return UpstreamExit::Shutdown;
            }
        };

        state.set_connectivity(ConnectivityState::Disconnected);

        match result {
            Ok(()) => {
                tracing::info!("upstream channel closed gracefully");
                attempt = 0;
            }
            Err(ConnectError::AuthRejected) => {
                tracing::error!("upstream rejected authentication");
                return UpstreamExit::AuthRejected;
            }
            Err(ConnectError::Other(e)) => {
                tracing::warn!(error = %e, attempt, "upstream connection lost");
            }
        }

        let delay = backoff.delay_for_attempt(attempt);
        tracing::info!(delay_ms = delay.as_millis() as u64, attempt = attempt + 1, "reconnecting");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = state.shutdown.cancelled() => return UpstreamExit::Shutdown,
        }
        attempt += 1;
    }
}

enum ConnectError {
    AuthRejected,
    Other(anyhow::Error),
}

async fn connect_and_run(state: &AgentState, config: &AgentConfig) -> Result<(), ConnectError> {
    let url = format!(
        "{}/api/bridge?userId={}&type=agent",
        config.server_url.trim_end_matches('/'),
        urlencoding_user_id(&config.user_id),
    );
    tracing::info!(%url, "connecting to bridge");

    let (ws, _response) = tokio_tungstenite::connect_async(&url).await.map_err(|e| {
        if is_auth_rejection(&e) {
            ConnectError::AuthRejected
        } else {
            ConnectError::Other(e.into())
        }
    })?;

    let (mut sink, mut stream) = ws.split();

    let metadata = {
        let info = state.session_info.read();
        ControlMessage::AgentMetadata {
            user_id: state.user_id.clone(),
            home_directory: info.home_directory.clone(),
            platform: info.platform,
            filesystem_index: info.filesystem_index.clone(),
        }
    };
    let frame = op15_protocol::encode_frame(&WireMessage::Control(metadata))
        .map_err(|e| ConnectError::Other(anyhow::anyhow!(e.to_string())))?;
    sink.send(Message::Text(frame))
        .await
        .map_err(|e| ConnectError::Other(e.into()))?;

    state.set_connectivity(ConnectivityState::Connected);

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(64);
    *state.upstream_tx.write() = Some(outbound_tx.clone());

    let ping_tx = outbound_tx.clone();
    let ping_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            ticker.tick().await;
            let ping = WireMessage::Control(ControlMessage::Ping { timestamp: Utc::now().timestamp_millis() });
            let Ok(frame) = op15_protocol::encode_frame(&ping) else { continue };
            if ping_tx.send(frame).await.is_err() {
                break;
            }
        }
    });

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS));

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => {
                if !handle_inbound_text(state, &outbound_tx, &semaphore, &text).await {
                    // Malformed frame (spec §4.1): close the channel so
                    // the reconnect loop above redials with a clean slate
                    // rather than keep reading a desynced stream.
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    ping_task.abort();
    writer_task.abort();
    *state.upstream_tx.write() = None;

    Ok(())
}

/// Returns `false` when `text` was a malformed frame the caller should
/// treat as a reason to close the channel (spec §4.1); `true` otherwise.
async fn handle_inbound_text(
    state: &AgentState,
    outbound_tx: &mpsc::Sender<String>,
    semaphore: &Arc<Semaphore>,
    text: &str,
) -> bool {
    let decoded = match op15_protocol::decode_frame(text) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(error = %e, "malformed frame from bridge, closing channel");
            return false;
        }
    };

    match decoded {
        WireMessage::Request(request) => {
            let state = state.clone();
            let tx = outbound_tx.clone();
            let permit = semaphore.clone().acquire_owned().await;
            tokio::spawn(async move {
                let _permit = permit;
                let response = dispatch(&state, request).await;
                if let Ok(frame) = op15_protocol::encode_frame(&WireMessage::Response(response)) {
                    let _ = tx.send(frame).await;
                }
            });
        }
        WireMessage::Control(ControlMessage::Ping { timestamp }) => {
            let pong = WireMessage::Control(ControlMessage::Pong { timestamp });
            if let Ok(frame) = op15_protocol::encode_frame(&pong) {
                let _ = outbound_tx.send(frame).await;
            }
        }
        WireMessage::Control(ControlMessage::Pong { .. }) => {}
        WireMessage::Control(ControlMessage::PlanApprove {
            mode,
            allowed_directories,
            allowed_operations,
            approved_plan,
        }) => {
            {
                let mut permissions = state.permissions.write();
                permissions.mode = mode;
                permissions.allowed_directories = allowed_directories;
                permissions.allowed_operations = allowed_operations;
                permissions.approved_plan = approved_plan;
                permissions.approved_step_cursor = 0;
            }
            let ack = WireMessage::Control(ControlMessage::PlanApproved { success: true });
            if let Ok(frame) = op15_protocol::encode_frame(&ack) {
                let _ = outbound_tx.send(frame).await;
            }
        }
        other => {
            tracing::debug!(?other, "unexpected inbound frame on upstream channel");
        }
    }
    true
}

fn is_auth_rejection(e: &tokio_tungstenite::tungstenite::Error) -> bool {
    matches!(
        e,
        tokio_tungstenite::tungstenite::Error::Http(resp)
            if resp.status() == axum::http::StatusCode::UNAUTHORIZED
                || resp.status() == axum::http::StatusCode::FORBIDDEN
    )
}

fn urlencoding_user_id(user_id: &str) -> String {
    user_id.replace(' ', "%20")
}
