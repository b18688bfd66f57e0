//! Pending RPC correlation: a `Mutex<HashMap<id, PendingEntry>>` of
//! one-shot completion senders, with bounded-wait via
//! `tokio::time::timeout` and bulk-fail on session loss.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{oneshot, Mutex};

use op15_domain::error::Error;
use op15_domain::session::UserId;
use op15_protocol::response::Response;

struct PendingEntry {
    user_id: UserId,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
    tx: oneshot::Sender<Result<Response, Error>>,
}

/// Cloud-side registry of in-flight RPCs awaiting a correlated Response.
pub struct PendingRegistry {
    pending: Mutex<HashMap<String, PendingEntry>>,
}

impl Default for PendingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Register a pending RPC and wait up to `deadline` for its
    /// completion. The completion sink is guaranteed to fire exactly once
    /// across all outcomes (response / timeout / explicit fail). On
    /// timeout this method removes its own entry so a late Response
    /// finds nothing to complete and is discarded.
    pub async fn wait_for(
        &self,
        request_id: String,
        user_id: UserId,
        deadline: Duration,
    ) -> Result<Response, Error> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(
                request_id.clone(),
                PendingEntry {
                    user_id,
                    created_at: Utc::now(),
                    tx,
                },
            );
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_canceled)) => Err(Error::AgentDisconnected(request_id)),
            Err(_elapsed) => {
                self.pending.lock().await.remove(&request_id);
                Err(Error::Timeout)
            }
        }
    }

    /// Complete a pending RPC by id with a successfully-received Response.
    /// Unknown ids are discarded and logged.
    pub async fn complete(&self, response: Response) {
        let mut pending = self.pending.lock().await;
        match pending.remove(&response.id) {
            Some(entry) => {
                let _ = entry.tx.send(Ok(response));
            }
            None => {
                tracing::warn!(request_id = %response.id, "response for unknown pending request, discarding");
            }
        }
    }

    /// Bulk-fail every pending RPC belonging to `user_id` — used on
    /// session supersede, close, or disconnect.
    pub async fn fail_all_for_user(&self, user_id: &str, error: Error) {
        let mut pending = self.pending.lock().await;
        let ids: Vec<String> = pending
            .iter()
            .filter(|(_, e)| e.user_id == user_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in ids {
            if let Some(entry) = pending.remove(&id) {
                let _ = entry.tx.send(Err(error.clone()));
            }
        }
    }

    pub async fn count_for_user(&self, user_id: &str) -> usize {
        self.pending.lock().await.values().filter(|e| e.user_id == user_id).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn complete_wakes_waiter() {
        let registry = PendingRegistry::new();
        let reg = std::sync::Arc::new(registry);
        let reg2 = reg.clone();

        let waiter = tokio::spawn(async move {
            reg2.wait_for("r1".into(), "u1".into(), Duration::from_secs(5)).await
        });

        // Give the waiter a moment to register.
        tokio::time::sleep(Duration::from_millis(20)).await;
        reg.complete(Response::ok("r1", serde_json::json!({"ok": true}))).await;

        let result = waiter.await.unwrap();
        assert!(result.unwrap().is_ok());
    }

    #[tokio::test]
    async fn unknown_id_is_discarded_without_panic() {
        let registry = PendingRegistry::new();
        registry.complete(Response::ok("ghost", serde_json::json!({}))).await;
    }

    #[tokio::test]
    async fn timeout_yields_timeout_error_and_clears_entry() {
        let registry = PendingRegistry::new();
        let err = registry
            .wait_for("r1".into(), "u1".into(), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err, Error::Timeout);
        assert_eq!(registry.count_for_user("u1").await, 0);
    }

    #[tokio::test]
    async fn fail_all_for_user_drains_only_that_user() {
        let registry = std::sync::Arc::new(PendingRegistry::new());
        let r1 = registry.clone();
        let r2 = registry.clone();
        let h1 = tokio::spawn(async move { r1.wait_for("a".into(), "u1".into(), Duration::from_secs(5)).await });
        let h2 = tokio::spawn(async move { r2.wait_for("b".into(), "u2".into(), Duration::from_secs(5)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        registry.fail_all_for_user("u1", Error::AgentDisconnected("superseded".into())).await;

        let res1 = h1.await.unwrap();
        assert!(matches!(res1, Err(Error::AgentDisconnected(_))));
        assert_eq!(registry.count_for_user("u2").await, 1);

        registry.complete(Response::ok("b", serde_json::json!({}))).await;
        let res2 = h2.await.unwrap();
        assert!(res2.unwrap().is_ok());
    }
}
