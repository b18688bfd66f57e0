//! Request envelope (cloud → agent).
//!
//! The wire shape flattens operation-specific fields alongside `id` and
//! `operation`; this is captured with `#[serde(flatten)]` into a generic
//! args map, which both the Permission Core (subset-match against an
//! approved plan step) and the Executor (typed extraction) consume.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::operation::Operation;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub operation: Operation,
    #[serde(flatten)]
    pub args: BTreeMap<String, Value>,
}

impl Request {
    pub fn new(id: impl Into<String>, operation: Operation, args: BTreeMap<String, Value>) -> Self {
        Self {
            id: id.into(),
            operation,
            args,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.args.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.args.get(key).and_then(Value::as_u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_op_specific_fields() {
        let raw = r#"{"id":"r1","operation":"fs.write","path":"/tmp/x","content":"y","createDirs":true}"#;
        let req: Request = serde_json::from_str(raw).unwrap();
        assert_eq!(req.id, "r1");
        assert_eq!(req.operation, Operation::FsWrite);
        assert_eq!(req.get_str("path"), Some("/tmp/x"));
        assert_eq!(req.get_str("content"), Some("y"));
        assert!(req.get_bool("createDirs", false));
    }

    #[test]
    fn missing_optional_field_uses_default() {
        let raw = r#"{"id":"r1","operation":"fs.list","path":"/tmp"}"#;
        let req: Request = serde_json::from_str(raw).unwrap();
        assert_eq!(req.get_u64("depth"), None);
    }
}
