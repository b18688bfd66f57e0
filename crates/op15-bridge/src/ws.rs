//! WebSocket endpoint for agent connections: handshake then loop.
//!
//! Flow:
//! 1. Agent connects to `ws(s)://{host}/api/bridge?userId={U}&type=agent`
//! 2. Agent sends `agent-metadata` control message
//! 3. Bridge responds `connected`, registers the session (superseding any
//!    prior session for the same user)
//! 4. Bidirectional loop: Requests flow out, Responses/control flow in,
//!    `ping`/`pong` heartbeat every 30s

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use op15_domain::error::Error;
use op15_domain::session::AgentSessionInfo;
use op15_protocol::{ControlMessage, WireMessage};

use crate::registry::register_and_supersede;
use crate::session::ConnectedSession;
use crate::state::AppState;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct BridgeWsQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    #[serde(rename = "type")]
    pub conn_type: Option<String>,
}

/// GET /api/bridge?userId=...&type=agent — upgrade to WebSocket.
/// Refuses the upgrade (closing with policy-violation) if either query
/// parameter is missing.
pub async fn bridge_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<BridgeWsQuery>,
) -> impl IntoResponse {
    let (Some(user_id), Some(conn_type)) = (query.user_id, query.conn_type) else {
        return (
            axum::http::StatusCode::BAD_REQUEST,
            "userId and type query parameters are required",
        )
            .into_response();
    };
    if conn_type != "agent" {
        return (
            axum::http::StatusCode::BAD_REQUEST,
            "unsupported connection type",
        )
            .into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
        .into_response()
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: String) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    let metadata = match wait_for_metadata(&mut ws_stream).await {
        Some(m) => m,
        None => {
            tracing::warn!(%user_id, "agent disconnected before sending agent-metadata");
            return;
        }
    };

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(64);
    let session = ConnectedSession::new_discovered(outbound_tx);
    session.mark_ready(AgentSessionInfo {
        user_id: user_id.clone(),
        connected_at: Utc::now(),
        home_directory: metadata.home_directory,
        platform: metadata.platform,
        loopback_endpoint: None,
        shared_secret: op15_domain::session::SharedSecret(String::new()),
        filesystem_index: metadata.filesystem_index,
        permissions: Default::default(),
    });

    register_and_supersede(&state.registry, &state.pending, &state.permission_acks, user_id.clone(), session.clone()).await;

    let ack = WireMessage::Control(ControlMessage::Connected { user_id: user_id.clone() });
    if let Ok(frame) = op15_protocol::encode_frame(&ack) {
        let _ = session.channel.send(frame).await;
    }

    tracing::info!(%user_id, "agent session ready");

    let writer_close_signal = session.close_signal.clone();
    let writer_session = session.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = outbound_rx.recv() => {
                    match frame {
                        Some(frame) => {
                            if ws_sink.send(Message::Text(frame)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = writer_close_signal.cancelled() => {
                    let reason = *writer_session.close_reason.read();
                    let code = if reason == "policy" { 1008 } else { 1000 };
                    let _ = ws_sink
                        .send(Message::Close(Some(axum::extract::ws::CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    let heartbeat_session = session.clone();
    let heartbeat_user = user_id.clone();
    let heartbeat_pending = state.pending.clone();
    let heartbeat_acks = state.permission_acks.clone();
    let heartbeat_registry = state.registry.clone();
    let heartbeat = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            ticker.tick().await;
            if !heartbeat_session.is_open() {
                break;
            }
            let ping = WireMessage::Control(ControlMessage::Ping { timestamp: Utc::now().timestamp_millis() });
            if let Ok(frame) = op15_protocol::encode_frame(&ping) {
                if heartbeat_session.channel.send(frame).await.is_err() {
                    break;
                }
            }
            if heartbeat_session.note_heartbeat_miss() == crate::session::SessionState::Closed {
                heartbeat_pending
                    .fail_all_for_user(&heartbeat_user, Error::AgentDisconnected("heartbeat timeout".into()))
                    .await;
                heartbeat_acks
                    .fail(&heartbeat_user, Error::AgentDisconnected("heartbeat timeout".into()))
                    .await;
                heartbeat_registry.remove_if_current(&heartbeat_user, &heartbeat_session);
                break;
            }
        }
    });

    loop {
        tokio::select! {
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => handle_inbound_text(&state, &session, &text).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            _ = session.close_signal.cancelled() => break,
        }
    }

    heartbeat.abort();
    writer.abort();
    state
        .pending
        .fail_all_for_user(&user_id, Error::AgentDisconnected("channel closed".into()))
        .await;
    state
        .permission_acks
        .fail(&user_id, Error::AgentDisconnected("channel closed".into()))
        .await;
    session.close();
    state.registry.remove_if_current(&user_id, &session);
    tracing::info!(%user_id, "agent session closed");
}

async fn handle_inbound_text(state: &AppState, session: &Arc<ConnectedSession>, text: &str) {
    let decoded = match op15_protocol::decode_frame(text) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(error = %e, "malformed frame from agent, closing channel");
            session.close_with_reason("policy");
            return;
        }
    };

    match decoded {
        WireMessage::Response(response) => {
            state.pending.complete(response).await;
        }
        WireMessage::Control(ControlMessage::Ping { timestamp }) => {
            let pong = WireMessage::Control(ControlMessage::Pong { timestamp });
            if let Ok(frame) = op15_protocol::encode_frame(&pong) {
                let _ = session.channel.send(frame).await;
            }
        }
        WireMessage::Control(ControlMessage::Pong { .. }) => {
            session.record_pong();
        }
        WireMessage::Control(ControlMessage::PlanApproved { success }) => {
            let user_id = session.info.read().as_ref().map(|i| i.user_id.clone());
            if let Some(user_id) = user_id {
                state.permission_acks.complete(&user_id, success).await;
            }
        }
        other => {
            tracing::debug!(?other, "unexpected inbound frame on agent channel");
        }
    }
}

struct MetadataHello {
    home_directory: std::path::PathBuf,
    platform: op15_domain::session::Platform,
    filesystem_index: op15_domain::fsindex::FsIndex,
}

async fn wait_for_metadata(
    stream: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) -> Option<MetadataHello> {
    let result = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
        while let Some(Ok(msg)) = stream.next().await {
            if let Message::Text(text) = msg {
                if let Ok(WireMessage::Control(ControlMessage::AgentMetadata {
                    home_directory,
                    platform,
                    filesystem_index,
                    ..
                })) = op15_protocol::decode_frame(&text)
                {
                    return Some(MetadataHello { home_directory, platform, filesystem_index });
                }
            }
        }
        None
    })
    .await;

    result.unwrap_or(None)
}
