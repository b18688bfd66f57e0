//! Cloud-side connected session: wraps the transport-agnostic
//! [`op15_domain::session::AgentSessionInfo`] with its outgoing channel
//! handle and the C8 state machine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use op15_domain::permissions::SessionPermissions;
use op15_domain::session::AgentSessionInfo;

/// C8 state machine: `DISCOVERED → READY → DEGRADED → CLOSED`, with a
/// `DEGRADED → READY` edge on a fresh handshake (modeled by replacing the
/// whole session rather than mutating in place; see `SessionRegistry::register`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Discovered,
    Ready,
    Degraded,
    Closed,
}

/// A session's outgoing channel: a bounded queue of raw text frames sent
/// to a writer task that owns the actual WebSocket sink, giving
/// single-writer serialization for free.
pub type ChannelSink = mpsc::Sender<String>;

pub struct ConnectedSession {
    pub info: RwLock<Option<AgentSessionInfo>>,
    pub state: RwLock<SessionState>,
    pub channel: ChannelSink,
    pub last_pong_at: RwLock<DateTime<Utc>>,
    pub missed_heartbeats: RwLock<u32>,
    /// Cancelled when this session is superseded, times out, or is
    /// otherwise closed — the socket's writer task watches this to send
    /// an actual WS close frame rather than leaving a superseded
    /// connection open and idle. `close_reason` carries the WS close
    /// reason the writer task should send alongside it: `superseded`
    /// (spec §4.5/§4.8) or `policy` (spec §4.1, malformed frame).
    pub close_signal: CancellationToken,
    pub close_reason: RwLock<&'static str>,
}

impl ConnectedSession {
    pub fn new_discovered(channel: ChannelSink) -> Arc<Self> {
        Arc::new(Self {
            info: RwLock::new(None),
            state: RwLock::new(SessionState::Discovered),
            channel,
            last_pong_at: RwLock::new(Utc::now()),
            missed_heartbeats: RwLock::new(0),
            close_signal: CancellationToken::new(),
            close_reason: RwLock::new("superseded"),
        })
    }

    pub fn mark_ready(&self, info: AgentSessionInfo) {
        *self.info.write() = Some(info);
        *self.state.write() = SessionState::Ready;
        *self.last_pong_at.write() = Utc::now();
        *self.missed_heartbeats.write() = 0;
    }

    /// Broad "connected" notion used by `isConnected` and by anything
    /// that only needs to know the channel is still up: true for both
    /// `READY` and `DEGRADED`. Do NOT use this to gate dispatch of a new
    /// RPC — see `is_dispatchable`.
    pub fn is_ready(&self) -> bool {
        *self.state.read() == SessionState::Ready || *self.state.read() == SessionState::Degraded
    }

    /// True only in `READY`. Per spec §4.8, `DEGRADED` accepts no new
    /// RPCs — only pendings already in flight continue until deadline —
    /// so this is the gate `ToolSurface::call` must use before handing a
    /// fresh request to the Transport Dispatcher.
    pub fn is_dispatchable(&self) -> bool {
        *self.state.read() == SessionState::Ready
    }

    pub fn is_open(&self) -> bool {
        *self.state.read() != SessionState::Closed
    }

    /// Record a `pong`: resets the missed-heartbeat counter, and if the
    /// session had degraded, brings it back to `READY`.
    pub fn record_pong(&self) {
        *self.last_pong_at.write() = Utc::now();
        *self.missed_heartbeats.write() = 0;
        let mut state = self.state.write();
        if *state == SessionState::Degraded {
            *state = SessionState::Ready;
        }
    }

    /// Called once per heartbeat interval when no `pong` arrived since the
    /// last tick. Returns the new state so the caller can act on a
    /// transition into `CLOSED` (fail pendings, remove session).
    pub fn note_heartbeat_miss(&self) -> SessionState {
        let mut missed = self.missed_heartbeats.write();
        *missed += 1;
        let mut state = self.state.write();
        *state = match (*state, *missed) {
            (SessionState::Closed, _) => SessionState::Closed,
            (_, n) if n >= 4 => SessionState::Closed,
            (_, n) if n >= 2 => SessionState::Degraded,
            (s, _) => s,
        };
        *state
    }

    pub fn close(&self) {
        *self.state.write() = SessionState::Closed;
        self.close_signal.cancel();
    }

    /// Close the channel for a specific reason (`policy` on a malformed
    /// frame, `superseded` on session replacement). Idempotent: the
    /// reason of the first call to close wins.
    pub fn close_with_reason(&self, reason: &'static str) {
        if self.close_signal.is_cancelled() {
            return;
        }
        *self.close_reason.write() = reason;
        self.close();
    }

    pub fn permissions_snapshot(&self) -> Option<SessionPermissions> {
        self.info.read().as_ref().map(|i| i.permissions.clone())
    }

    pub fn update_permissions(&self, f: impl FnOnce(&mut SessionPermissions)) {
        if let Some(info) = self.info.write().as_mut() {
            f(&mut info.permissions);
        }
    }
}
