//! Waiters for the `plan-approved` ack that follows a `plan-approve`
//! control message, mirroring [`crate::pending::PendingRegistry`] but
//! keyed by `user_id` instead of request `id` since control messages
//! carry no correlation identifier of their own.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};

use op15_domain::error::Error;
use op15_domain::session::UserId;

/// Cloud-side registry of in-flight `plan-approve` round trips. At most
/// one outstanding wait per user: a second `update_permissions` call for
/// the same user while one is already in flight replaces the waiter, and
/// the earlier caller times out.
pub struct PermissionAckRegistry {
    waiters: Mutex<HashMap<UserId, oneshot::Sender<bool>>>,
}

impl Default for PermissionAckRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionAckRegistry {
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Register a waiter for `user_id` and wait up to `deadline` for the
    /// matching `plan-approved` ack. Returns `Error::Timeout` if the ack
    /// never arrives.
    pub async fn wait_for(&self, user_id: UserId, deadline: Duration) -> Result<bool, Error> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.insert(user_id, tx);

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(success)) => Ok(success),
            Ok(Err(_canceled)) => Err(Error::AgentDisconnected("channel closed before plan-approved ack".into())),
            Err(_elapsed) => Err(Error::Timeout),
        }
    }

    /// Complete the waiter for `user_id`, if any. Unmatched acks (no
    /// caller currently waiting) are discarded and logged.
    pub async fn complete(&self, user_id: &str, success: bool) {
        let mut waiters = self.waiters.lock().await;
        match waiters.remove(user_id) {
            Some(tx) => {
                let _ = tx.send(success);
            }
            None => {
                tracing::debug!(%user_id, success, "plan-approved ack with no waiting caller, discarding");
            }
        }
    }

    /// Fail any waiter for `user_id` outright — used on session loss.
    pub async fn fail(&self, user_id: &str, error: Error) {
        let mut waiters = self.waiters.lock().await;
        if let Some(tx) = waiters.remove(user_id) {
            // Dropping `tx` without sending cancels the waiter, which
            // surfaces as `Error::AgentDisconnected` on the receiving end.
            drop(tx);
            let _ = error;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn complete_wakes_waiter_with_success_flag() {
        let registry = std::sync::Arc::new(PermissionAckRegistry::new());
        let r2 = registry.clone();

        let waiter = tokio::spawn(async move { r2.wait_for("u1".into(), Duration::from_secs(5)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.complete("u1", true).await;

        assert!(waiter.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn timeout_yields_timeout_error() {
        let registry = PermissionAckRegistry::new();
        let err = registry.wait_for("u1".into(), Duration::from_millis(20)).await.unwrap_err();
        assert_eq!(err, Error::Timeout);
    }

    #[tokio::test]
    async fn unmatched_ack_is_discarded_without_panic() {
        let registry = PermissionAckRegistry::new();
        registry.complete("ghost", true).await;
    }

    #[tokio::test]
    async fn fail_cancels_waiter() {
        let registry = std::sync::Arc::new(PermissionAckRegistry::new());
        let r2 = registry.clone();
        let waiter = tokio::spawn(async move { r2.wait_for("u1".into(), Duration::from_secs(5)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.fail("u1", Error::AgentDisconnected("superseded".into())).await;
        assert!(waiter.await.unwrap().is_err());
    }
}
