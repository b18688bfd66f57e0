//! Response envelope (agent → cloud).
//!
//! Exactly one of `data`/`error` is present; never both, never neither.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data: Some(data),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, error_kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: None,
            error: Some(error_kind.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_response_serializes_without_error_key() {
        let r = Response::ok("r1", serde_json::json!({"entries": []}));
        let v = serde_json::to_value(&r).unwrap();
        assert!(v.get("error").is_none());
        assert_eq!(v["id"], "r1");
    }

    #[test]
    fn err_response_serializes_without_data_key() {
        let r = Response::err("r1", "permission-denied");
        let v = serde_json::to_value(&r).unwrap();
        assert!(v.get("data").is_none());
        assert_eq!(v["error"], "permission-denied");
    }
}
