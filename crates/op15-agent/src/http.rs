//! Loopback HTTP listener: nine endpoints, bound strictly to
//! `127.0.0.1`, mutating endpoints gated on `x-agent-secret`.

use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response as AxumResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use op15_protocol::operation::Operation;
use op15_protocol::request::Request as OpRequest;

use crate::dispatch::dispatch;
use crate::state::AgentState;

pub fn router(state: AgentState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/execute", post(execute))
        .route("/fs/list", get(fs_list))
        .route("/fs/read", get(fs_read))
        .route("/fs/write", post(fs_write))
        .route("/fs/delete", post(fs_delete))
        .route("/fs/move", post(fs_move))
        .route("/status", get(status))
        .route("/logs", get(logs))
        .route("/plan/approve", post(plan_approve))
        .route("/kill", post(kill))
        .with_state(state)
}

fn require_secret(state: &AgentState, headers: &HeaderMap) -> Result<(), AxumResponse> {
    let provided = headers.get("x-agent-secret").and_then(|v| v.to_str().ok()).unwrap_or("");
    if state.secret_matches(provided) {
        Ok(())
    } else {
        Err((StatusCode::FORBIDDEN, Json(serde_json::json!({ "error": "forbidden" }))).into_response())
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now(),
    }))
}

fn response_status(error_kind: &str) -> StatusCode {
    match error_kind {
        "forbidden" => StatusCode::FORBIDDEN,
        "not-found" => StatusCode::NOT_FOUND,
        "permission-denied" | "plan-violation" => StatusCode::FORBIDDEN,
        "unknown-operation" | "invalid-cwd" | "is-a-directory" | "not-a-directory" | "not-empty" | "cross-device" | "too-large" => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn run_operation(state: &AgentState, operation: Operation, args: BTreeMap<String, Value>) -> AxumResponse {
    let request = OpRequest::new(Uuid::new_v4().to_string(), operation, args);
    let response = dispatch(state, request).await;
    match &response.error {
        None => (StatusCode::OK, Json(response)).into_response(),
        Some(kind) => (response_status(kind), Json(response)).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct ExecuteBody {
    command: String,
    cwd: Option<String>,
    #[serde(rename = "timeoutMs")]
    timeout_ms: Option<u64>,
}

async fn execute(
    State(state): State<AgentState>,
    headers: HeaderMap,
    Json(body): Json<ExecuteBody>,
) -> AxumResponse {
    if let Err(resp) = require_secret(&state, &headers) {
        return resp;
    }
    let mut args = BTreeMap::new();
    args.insert("command".to_string(), Value::String(body.command));
    if let Some(cwd) = body.cwd {
        args.insert("cwd".to_string(), Value::String(cwd));
    }
    if let Some(t) = body.timeout_ms {
        args.insert("timeoutMs".to_string(), Value::from(t));
    }
    run_operation(&state, Operation::ExecRun, args).await
}

#[derive(Debug, Deserialize)]
struct FsListQuery {
    path: String,
    depth: Option<u64>,
}

async fn fs_list(State(state): State<AgentState>, Query(q): Query<FsListQuery>) -> AxumResponse {
    let mut args = BTreeMap::new();
    args.insert("path".to_string(), Value::String(q.path));
    if let Some(d) = q.depth {
        args.insert("depth".to_string(), Value::from(d));
    }
    run_operation(&state, Operation::FsList, args).await
}

#[derive(Debug, Deserialize)]
struct FsReadQuery {
    path: String,
}

async fn fs_read(State(state): State<AgentState>, Query(q): Query<FsReadQuery>) -> AxumResponse {
    let mut args = BTreeMap::new();
    args.insert("path".to_string(), Value::String(q.path));
    run_operation(&state, Operation::FsRead, args).await
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct FsWriteBody {
    path: String,
    content: String,
    #[serde(rename = "createDirs", default = "default_true")]
    create_dirs: bool,
}

async fn fs_write(
    State(state): State<AgentState>,
    headers: HeaderMap,
    Json(body): Json<FsWriteBody>,
) -> AxumResponse {
    if let Err(resp) = require_secret(&state, &headers) {
        return resp;
    }
    let mut args = BTreeMap::new();
    args.insert("path".to_string(), Value::String(body.path));
    args.insert("content".to_string(), Value::String(body.content));
    args.insert("createDirs".to_string(), Value::Bool(body.create_dirs));
    run_operation(&state, Operation::FsWrite, args).await
}

#[derive(Debug, Deserialize)]
struct FsDeleteBody {
    path: String,
    #[serde(default)]
    recursive: bool,
}

async fn fs_delete(
    State(state): State<AgentState>,
    headers: HeaderMap,
    Json(body): Json<FsDeleteBody>,
) -> AxumResponse {
    if let Err(resp) = require_secret(&state, &headers) {
        return resp;
    }
    let mut args = BTreeMap::new();
    args.insert("path".to_string(), Value::String(body.path));
    args.insert("recursive".to_string(), Value::Bool(body.recursive));
    run_operation(&state, Operation::FsDelete, args).await
}

#[derive(Debug, Deserialize)]
struct FsMoveBody {
    source: String,
    destination: String,
    #[serde(rename = "createDestDirs", default)]
    create_dest_dirs: bool,
}

async fn fs_move(
    State(state): State<AgentState>,
    headers: HeaderMap,
    Json(body): Json<FsMoveBody>,
) -> AxumResponse {
    if let Err(resp) = require_secret(&state, &headers) {
        return resp;
    }
    let mut args = BTreeMap::new();
    args.insert("source".to_string(), Value::String(body.source));
    args.insert("destination".to_string(), Value::String(body.destination));
    args.insert("createDestDirs".to_string(), Value::Bool(body.create_dest_dirs));
    run_operation(&state, Operation::FsMove, args).await
}

async fn status(State(state): State<AgentState>) -> impl IntoResponse {
    let permissions = state.permissions.read().clone();
    Json(serde_json::json!({
        "userId": state.user_id,
        "connected": state.is_connected(),
        "permissions": permissions,
    }))
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    limit: Option<usize>,
}

async fn logs(State(state): State<AgentState>, Query(q): Query<LogsQuery>) -> impl IntoResponse {
    let limit = q.limit.unwrap_or(100);
    let entries = state.action_log.recent(limit);
    Json(serde_json::json!({
        "logs": entries,
        "total": state.action_log.total(),
    }))
}

async fn plan_approve(
    State(state): State<AgentState>,
    headers: HeaderMap,
    Json(body): Json<op15_domain::permissions::SessionPermissions>,
) -> AxumResponse {
    if let Err(resp) = require_secret(&state, &headers) {
        return resp;
    }
    *state.permissions.write() = body;
    (StatusCode::OK, Json(serde_json::json!({ "success": true }))).into_response()
}

async fn kill(State(state): State<AgentState>, headers: HeaderMap) -> AxumResponse {
    if let Err(resp) = require_secret(&state, &headers) {
        return resp;
    }
    tracing::info!("kill requested via loopback HTTP, shutting down");
    state.shutdown.cancel();
    (StatusCode::OK, Json(serde_json::json!({ "success": true }))).into_response()
}
