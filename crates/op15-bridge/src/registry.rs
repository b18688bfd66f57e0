//! Session registry keyed by `user_id` — at most one session per user,
//! so there is no routing decision to make, only a lookup.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use op15_domain::session::UserId;

use crate::pending::PendingRegistry;
use crate::permission_ack::PermissionAckRegistry;
use crate::session::ConnectedSession;

/// Process-wide registry of connected sessions. At most one entry
/// exists per `user_id`.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<UserId, Arc<ConnectedSession>>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new session for `user_id`. If one already existed,
    /// it is closed and returned so the caller can fail its pendings
    /// and drop its channel.
    pub fn register(&self, user_id: UserId, session: Arc<ConnectedSession>) -> Option<Arc<ConnectedSession>> {
        let previous = self.sessions.write().insert(user_id, session);
        if let Some(prev) = &previous {
            prev.close();
        }
        previous
    }

    pub fn get(&self, user_id: &str) -> Option<Arc<ConnectedSession>> {
        self.sessions.read().get(user_id).cloned()
    }

    pub fn is_connected(&self, user_id: &str) -> bool {
        self.sessions.read().get(user_id).map(|s| s.is_ready()).unwrap_or(false)
    }

    /// Remove a session, but only if it is still the one registered under
    /// `user_id` (a stale reader shouldn't evict a session that was
    /// already superseded by a newer handshake). Returns whether the
    /// removal happened, so a caller tearing down a connection can tell a
    /// genuine disconnect (removal happens) from having lost a supersede
    /// race (session was already replaced, nothing to remove).
    pub fn remove_if_current(&self, user_id: &str, session: &Arc<ConnectedSession>) -> bool {
        let mut sessions = self.sessions.write();
        if let Some(current) = sessions.get(user_id) {
            if Arc::ptr_eq(current, session) {
                sessions.remove(user_id);
                return true;
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every currently-registered user id (used for heartbeat sweeps).
    pub fn user_ids(&self) -> Vec<UserId> {
        self.sessions.read().keys().cloned().collect()
    }
}

/// Replace the session for `user_id`, failing the previous session's
/// pendings (and any in-flight permission-update wait) with `superseded`.
pub async fn register_and_supersede(
    registry: &SessionRegistry,
    pending: &PendingRegistry,
    permission_acks: &PermissionAckRegistry,
    user_id: UserId,
    session: Arc<ConnectedSession>,
) {
    if let Some(previous) = registry.register(user_id.clone(), session) {
        pending
            .fail_all_for_user(&user_id, op15_domain::Error::AgentDisconnected("superseded".into()))
            .await;
        permission_acks
            .fail(&user_id, op15_domain::Error::AgentDisconnected("superseded".into()))
            .await;
        drop(previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn fresh_session() -> Arc<ConnectedSession> {
        let (tx, _rx) = mpsc::channel(8);
        ConnectedSession::new_discovered(tx)
    }

    #[test]
    fn register_replaces_and_closes_previous() {
        let registry = SessionRegistry::new();
        let s1 = fresh_session();
        let s2 = fresh_session();
        registry.register("u1".into(), s1.clone());
        assert!(s1.is_open());
        let previous = registry.register("u1".into(), s2.clone());
        assert!(previous.is_some());
        assert!(!s1.is_open());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn session_replacement_fails_old_pendings() {
        let registry = SessionRegistry::new();
        let pending = PendingRegistry::new();
        let s1 = fresh_session();
        registry.register("u1".into(), s1.clone());

        let p = std::sync::Arc::new(pending);
        let p1 = p.clone();
        let h1 = tokio::spawn(async move {
            p1.wait_for("r1".into(), "u1".into(), std::time::Duration::from_secs(5)).await
        });
        let p2 = p.clone();
        let h2 = tokio::spawn(async move {
            p2.wait_for("r2".into(), "u1".into(), std::time::Duration::from_secs(5)).await
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let s2 = fresh_session();
        let acks = PermissionAckRegistry::new();
        register_and_supersede(&registry, &p, &acks, "u1".into(), s2.clone()).await;

        assert!(matches!(h1.await.unwrap(), Err(op15_domain::Error::AgentDisconnected(_))));
        assert!(matches!(h2.await.unwrap(), Err(op15_domain::Error::AgentDisconnected(_))));
        assert!(Arc::ptr_eq(&registry.get("u1").unwrap(), &s2));
    }

    #[test]
    fn remove_if_current_ignores_stale_handle() {
        let registry = SessionRegistry::new();
        let s1 = fresh_session();
        let s2 = fresh_session();
        registry.register("u1".into(), s1.clone());
        registry.register("u1".into(), s2.clone());
        registry.remove_if_current("u1", &s1); // stale, should no-op
        assert_eq!(registry.len(), 1);
        registry.remove_if_current("u1", &s2);
        assert_eq!(registry.len(), 0);
    }
}
