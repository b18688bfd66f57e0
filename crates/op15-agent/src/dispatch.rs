//! Dispatch algorithm: permission check, then Executor call,
//! then ActionLog entry — shared by both the loopback HTTP listener and
//! the upstream channel reader.

use std::path::Path;
use std::time::Duration;

use op15_domain::action_log::{ActionLogEntry, ActionOutcome};
use op15_domain::error::{Error, Result};
use op15_protocol::operation::Operation;
use op15_protocol::request::Request;
use op15_protocol::response::Response;

use crate::state::AgentState;

pub async fn dispatch(state: &AgentState, request: Request) -> Response {
    let base = {
        let info = state.session_info.read();
        info.home_directory.clone()
    };

    let mut permissions = state.permissions.write();
    let check_result = op15_permission::check(&request, &mut permissions, &base);
    drop(permissions);

    match check_result {
        Ok(()) => {}
        Err(e) => {
            log_outcome(state, &request, ActionOutcome::Denied, Some(e.to_string()));
            return Response::err(request.id, e.kind());
        }
    }

    let result = execute(&request, &base).await;
    match result {
        Ok(value) => {
            log_outcome(state, &request, ActionOutcome::Success, None);
            Response::ok(request.id, value)
        }
        Err(e) => {
            log_outcome(state, &request, ActionOutcome::Error, Some(e.to_string()));
            Response::err(request.id, e.kind())
        }
    }
}

async fn execute(request: &Request, home: &Path) -> Result<serde_json::Value> {
    match &request.operation {
        Operation::FsList => {
            let path = request.get_str("path").ok_or_else(|| Error::Other("missing path".into()))?;
            let depth = request.get_u64("depth").unwrap_or(0) as u32;
            let entries = op15_executor::list(Path::new(path), depth)?;
            Ok(serde_json::json!({ "entries": entries }))
        }
        Operation::FsRead => {
            let path = request.get_str("path").ok_or_else(|| Error::Other("missing path".into()))?;
            let content = op15_executor::read(Path::new(path), request.get_u64("maxBytes"))?;
            Ok(serde_json::json!({ "content": content }))
        }
        Operation::FsWrite => {
            let path = request.get_str("path").ok_or_else(|| Error::Other("missing path".into()))?;
            let content = request.get_str("content").unwrap_or("");
            let create_dirs = request.get_bool("createDirs", true);
            op15_executor::write(Path::new(path), content, create_dirs)?;
            Ok(serde_json::json!({ "success": true }))
        }
        Operation::FsDelete => {
            let path = request.get_str("path").ok_or_else(|| Error::Other("missing path".into()))?;
            let recursive = request.get_bool("recursive", false);
            op15_executor::delete(Path::new(path), recursive)?;
            Ok(serde_json::json!({ "success": true }))
        }
        Operation::FsMove => {
            let source = request.get_str("source").ok_or_else(|| Error::Other("missing source".into()))?;
            let destination = request.get_str("destination").ok_or_else(|| Error::Other("missing destination".into()))?;
            let create_dest_dirs = request.get_bool("createDestDirs", false);
            op15_executor::mv(Path::new(source), Path::new(destination), create_dest_dirs)?;
            Ok(serde_json::json!({ "success": true }))
        }
        Operation::ExecRun => {
            let command = request.get_str("command").ok_or_else(|| Error::Other("missing command".into()))?;
            let cwd = op15_executor::exec::resolve_cwd(request.get_str("cwd").map(Path::new), None, home)?;
            let timeout = request.get_u64("timeoutMs").map(Duration::from_millis);
            let outcome = op15_executor::exec_run(command, &cwd, timeout).await?;
            Ok(serde_json::json!({
                "exitCode": outcome.exit_code,
                "stdout": outcome.stdout,
                "stderr": outcome.stderr,
            }))
        }
        Operation::Unknown(name) => Err(Error::UnknownOperation(name.clone())),
    }
}

fn log_outcome(state: &AgentState, request: &Request, outcome: ActionOutcome, details: Option<String>) {
    state.action_log.push(ActionLogEntry {
        timestamp: chrono::Utc::now(),
        user_id: state.user_id.clone(),
        operation: request.operation.as_str().to_string(),
        path: request.get_str("path").map(|s| s.to_string()),
        command: request.get_str("command").map(|s| s.to_string()),
        result: outcome,
        details,
    });
}
