//! Tool Surface: the six stateless entry points a tool-calling layer
//! invokes. Every call is gated on the session being connected — there is
//! no server-local fallback execution, ever.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use op15_domain::error::Error;
use op15_domain::permissions::SessionPermissions;
use op15_domain::session::UserId;
use op15_protocol::control::ControlMessage;
use op15_protocol::operation::Operation;
use op15_protocol::request::Request;
use op15_protocol::response::Response;
use op15_protocol::WireMessage;

use crate::pending::PendingRegistry;
use crate::permission_ack::PermissionAckRegistry;
use crate::registry::SessionRegistry;
use crate::transport::dispatch;

const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);
const PLAN_APPROVE_DEADLINE: Duration = Duration::from_secs(10);

pub struct ToolSurface {
    pub registry: Arc<SessionRegistry>,
    pub pending: Arc<PendingRegistry>,
    pub permission_acks: Arc<PermissionAckRegistry>,
    pub http: reqwest::Client,
}

impl ToolSurface {
    pub fn new(registry: Arc<SessionRegistry>, pending: Arc<PendingRegistry>, permission_acks: Arc<PermissionAckRegistry>) -> Self {
        Self {
            registry,
            pending,
            permission_acks,
            http: reqwest::Client::new(),
        }
    }

    async fn call(&self, user_id: &UserId, operation: Operation, args: BTreeMap<String, Value>) -> Result<Response, Error> {
        let session = self
            .registry
            .get(user_id)
            .filter(|s| s.is_dispatchable())
            .ok_or_else(|| Error::AgentNotConnected(user_id.clone()))?;

        let request = Request::new(Uuid::new_v4().to_string(), operation, args);
        dispatch(&self.http, &self.pending, &session, user_id, request, DEFAULT_DEADLINE, false).await
    }

    pub async fn fs_list(&self, user_id: &UserId, path: &str, depth: Option<u64>) -> Result<Response, Error> {
        let mut args = BTreeMap::new();
        args.insert("path".to_string(), Value::String(path.to_string()));
        if let Some(d) = depth {
            args.insert("depth".to_string(), Value::from(d));
        }
        let response = self.call(user_id, Operation::FsList, args).await?;
        Ok(cosmetic_sort_listing(response))
    }

    pub async fn fs_read(&self, user_id: &UserId, path: &str) -> Result<Response, Error> {
        let mut args = BTreeMap::new();
        args.insert("path".to_string(), Value::String(path.to_string()));
        self.call(user_id, Operation::FsRead, args).await
    }

    pub async fn fs_write(&self, user_id: &UserId, path: &str, content: &str, create_dirs: bool) -> Result<Response, Error> {
        let mut args = BTreeMap::new();
        args.insert("path".to_string(), Value::String(path.to_string()));
        args.insert("content".to_string(), Value::String(content.to_string()));
        args.insert("createDirs".to_string(), Value::Bool(create_dirs));
        self.call(user_id, Operation::FsWrite, args).await
    }

    pub async fn fs_delete(&self, user_id: &UserId, path: &str, recursive: bool) -> Result<Response, Error> {
        let mut args = BTreeMap::new();
        args.insert("path".to_string(), Value::String(path.to_string()));
        args.insert("recursive".to_string(), Value::Bool(recursive));
        self.call(user_id, Operation::FsDelete, args).await
    }

    pub async fn fs_move(
        &self,
        user_id: &UserId,
        source: &str,
        destination: &str,
        create_dest_dirs: bool,
    ) -> Result<Response, Error> {
        let mut args = BTreeMap::new();
        args.insert("source".to_string(), Value::String(source.to_string()));
        args.insert("destination".to_string(), Value::String(destination.to_string()));
        args.insert("createDestDirs".to_string(), Value::Bool(create_dest_dirs));
        self.call(user_id, Operation::FsMove, args).await
    }

    pub async fn exec_run(&self, user_id: &UserId, command: &str, cwd: Option<&str>, timeout_ms: Option<u64>) -> Result<Response, Error> {
        let mut args = BTreeMap::new();
        args.insert("command".to_string(), Value::String(command.to_string()));
        if let Some(c) = cwd {
            args.insert("cwd".to_string(), Value::String(c.to_string()));
        }
        if let Some(t) = timeout_ms {
            args.insert("timeoutMs".to_string(), Value::from(t));
        }
        self.call(user_id, Operation::ExecRun, args).await
    }

    /// Forward a `plan-approve` control message to the session's agent and
    /// wait for its `plan-approved` ack. On success, updates the bridge's
    /// cached permission snapshot so subsequent RPCs observe the new grant
    /// immediately, without waiting on a round trip back through the
    /// session itself.
    pub async fn update_permissions(&self, user_id: &UserId, plan: SessionPermissions) -> Result<bool, Error> {
        let session = self
            .registry
            .get(user_id)
            .filter(|s| s.is_open())
            .ok_or_else(|| Error::AgentNotConnected(user_id.clone()))?;

        let control = WireMessage::Control(ControlMessage::PlanApprove {
            mode: plan.mode,
            allowed_directories: plan.allowed_directories.clone(),
            allowed_operations: plan.allowed_operations.clone(),
            approved_plan: plan.approved_plan.clone(),
        });
        let frame = op15_protocol::encode_frame(&control)?;
        session
            .channel
            .send(frame)
            .await
            .map_err(|_| Error::AgentDisconnected(user_id.clone()))?;

        let success = self.permission_acks.wait_for(user_id.clone(), PLAN_APPROVE_DEADLINE).await?;
        if success {
            session.update_permissions(|current| *current = plan);
        }
        Ok(success)
    }
}

/// Optional cosmetic reordering of `fs.list` entries: directories before
/// files, then case-insensitive name order within each group. Leaves
/// error responses and non-array `entries` fields untouched.
fn cosmetic_sort_listing(mut response: Response) -> Response {
    let Some(data) = response.data.as_mut() else {
        return response;
    };
    let Some(entries) = data.get_mut("entries").and_then(Value::as_array_mut) else {
        return response;
    };
    entries.sort_by(|a, b| {
        let a_is_dir = a.get("kind").and_then(Value::as_str) == Some("directory");
        let b_is_dir = b.get("kind").and_then(Value::as_str) == Some("directory");
        let a_name = a.get("name").and_then(Value::as_str).unwrap_or("").to_lowercase();
        let b_name = b.get("name").and_then(Value::as_str).unwrap_or("").to_lowercase();
        b_is_dir.cmp(&a_is_dir).then(a_name.cmp(&b_name))
    });
    response
}
