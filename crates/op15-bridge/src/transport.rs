//! Transport Dispatcher: HTTP-preferred-when-reachable, channel-fallback
//! policy, layering a `reqwest`-based loopback call on top of the
//! WebSocket data path.

use std::sync::Arc;
use std::time::Duration;

use op15_domain::error::Error;
use op15_domain::session::UserId;
use op15_protocol::operation::Operation;
use op15_protocol::request::Request;
use op15_protocol::response::Response;

use crate::pending::PendingRegistry;
use crate::session::ConnectedSession;

/// Which path a given call should use, resolved once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportChoice {
    Http,
    Channel,
}

/// Choose HTTP when the session published a loopback endpoint, else fall
/// back to the channel. A caller can force the channel (e.g. when it
/// knows it's not colocated with the agent's loopback listener) by
/// passing `prefer_channel = true`.
pub fn choose_transport(session: &ConnectedSession, prefer_channel: bool) -> TransportChoice {
    if prefer_channel {
        return TransportChoice::Channel;
    }
    let has_loopback = session
        .info
        .read()
        .as_ref()
        .and_then(|i| i.loopback_endpoint.as_ref())
        .is_some();
    if has_loopback {
        TransportChoice::Http
    } else {
        TransportChoice::Channel
    }
}

/// Dispatch `request` to the agent for `user_id`, via whichever transport
/// `choose_transport` picks. Both the HTTP-unreachable and the
/// channel-timeout failure paths surface as `Error::AgentUnreachable`.
pub async fn dispatch(
    http: &reqwest::Client,
    pending: &Arc<PendingRegistry>,
    session: &Arc<ConnectedSession>,
    user_id: &UserId,
    request: Request,
    deadline: Duration,
    prefer_channel: bool,
) -> Result<Response, Error> {
    match choose_transport(session, prefer_channel) {
        TransportChoice::Http => match dispatch_http(http, session, &request, deadline).await {
            Ok(response) => Ok(response),
            Err(_) => dispatch_channel(pending, session, user_id, request, deadline).await,
        },
        TransportChoice::Channel => dispatch_channel(pending, session, user_id, request, deadline).await,
    }
}

/// Each operation has its own loopback route (spec §4.3); `fs.list` and
/// `fs.read` are `GET`s with query params, everything else is a `POST`
/// with a JSON body. Unknown operations have no route of their own and
/// are rejected here so the caller falls back to the channel, where the
/// agent's dispatch layer reports `unknown-operation` itself.
fn route_for(op: &Operation, request: &Request) -> Result<(reqwest::Method, String), Error> {
    use reqwest::Method;
    match op {
        Operation::FsList => {
            let path = request.get_str("path").unwrap_or_default();
            let mut url = format!("/fs/list?path={}", percent_encode(path));
            if let Some(depth) = request.get_u64("depth") {
                url.push_str(&format!("&depth={depth}"));
            }
            Ok((Method::GET, url))
        }
        Operation::FsRead => {
            let path = request.get_str("path").unwrap_or_default();
            Ok((Method::GET, format!("/fs/read?path={}", percent_encode(path))))
        }
        Operation::FsWrite => Ok((Method::POST, "/fs/write".to_string())),
        Operation::FsDelete => Ok((Method::POST, "/fs/delete".to_string())),
        Operation::FsMove => Ok((Method::POST, "/fs/move".to_string())),
        Operation::ExecRun => Ok((Method::POST, "/execute".to_string())),
        Operation::Unknown(name) => Err(Error::UnknownOperation(name.clone())),
    }
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

async fn dispatch_http(
    http: &reqwest::Client,
    session: &ConnectedSession,
    request: &Request,
    deadline: Duration,
) -> Result<Response, Error> {
    let endpoint = session
        .info
        .read()
        .as_ref()
        .and_then(|i| i.loopback_endpoint.clone())
        .ok_or_else(|| Error::AgentUnreachable("no loopback endpoint published".into()))?;
    let secret = session
        .info
        .read()
        .as_ref()
        .map(|i| i.shared_secret.as_str().to_string())
        .ok_or_else(|| Error::AgentUnreachable("session has no shared secret".into()))?;

    let (method, route) = route_for(&request.operation, request)?;
    let url = format!("{}{}", endpoint.trim_end_matches('/'), route);
    let mut builder = http.request(method.clone(), &url).header("x-agent-secret", secret.as_str());
    if method == reqwest::Method::POST {
        builder = builder.json(request);
    }
    let result = tokio::time::timeout(deadline, builder.send()).await;

    match result {
        Err(_elapsed) => Err(Error::AgentUnreachable(format!("{url} timed out"))),
        Ok(Err(e)) => Err(Error::AgentUnreachable(e.to_string())),
        Ok(Ok(resp)) => resp
            .json::<Response>()
            .await
            .map_err(|e| Error::AgentUnreachable(e.to_string())),
    }
}

async fn dispatch_channel(
    pending: &Arc<PendingRegistry>,
    session: &Arc<ConnectedSession>,
    user_id: &UserId,
    request: Request,
    deadline: Duration,
) -> Result<Response, Error> {
    let frame = op15_protocol::encode_frame(&op15_protocol::WireMessage::Request(request.clone()))?;
    session
        .channel
        .send(frame)
        .await
        .map_err(|_| Error::AgentUnreachable("channel writer closed".into()))?;

    pending.wait_for(request.id, user_id.clone(), deadline).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn session_without_loopback() -> Arc<ConnectedSession> {
        let (tx, _rx) = mpsc::channel(8);
        ConnectedSession::new_discovered(tx)
    }

    #[test]
    fn no_loopback_published_chooses_channel() {
        let session = session_without_loopback();
        assert_eq!(choose_transport(&session, false), TransportChoice::Channel);
    }

    #[test]
    fn prefer_channel_overrides_loopback_presence() {
        let session = session_without_loopback();
        assert_eq!(choose_transport(&session, true), TransportChoice::Channel);
    }

    fn req(op: Operation, args: &[(&str, serde_json::Value)]) -> Request {
        Request::new("r1", op, args.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    #[test]
    fn fs_list_routes_to_get_with_query_params() {
        let request = req(Operation::FsList, &[("path", "/tmp/a b".into()), ("depth", 2.into())]);
        let (method, url) = route_for(&request.operation, &request).unwrap();
        assert_eq!(method, reqwest::Method::GET);
        assert_eq!(url, "/fs/list?path=/tmp/a%20b&depth=2");
    }

    #[test]
    fn fs_write_routes_to_post() {
        let request = req(Operation::FsWrite, &[("path", "/tmp/x".into())]);
        let (method, url) = route_for(&request.operation, &request).unwrap();
        assert_eq!(method, reqwest::Method::POST);
        assert_eq!(url, "/fs/write");
    }

    #[test]
    fn exec_run_routes_to_execute() {
        let request = req(Operation::ExecRun, &[("command", "ls".into())]);
        let (method, url) = route_for(&request.operation, &request).unwrap();
        assert_eq!(method, reqwest::Method::POST);
        assert_eq!(url, "/execute");
    }

    #[test]
    fn unknown_operation_has_no_http_route() {
        let request = req(Operation::Unknown("fs.copy".into()), &[]);
        let err = route_for(&request.operation, &request).unwrap_err();
        assert_eq!(err.kind(), "unknown-operation");
    }
}
