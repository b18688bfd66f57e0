//! The closed set of operations carried by a [`crate::request::Request`],
//! modeled as a Rust enum with a stringly-typed wire representation and
//! a tagged-sum-type internal one.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    FsList,
    FsRead,
    FsWrite,
    FsDelete,
    FsMove,
    ExecRun,
    /// Any wire name not in the closed set above — notably the reserved
    /// `fs.copy` / `fs.create` slots, which parse here rather than
    /// failing JSON deserialization, and are rejected at dispatch time
    /// with `unknown-operation`.
    Unknown(String),
}

impl Operation {
    pub fn as_str(&self) -> &str {
        match self {
            Operation::FsList => "fs.list",
            Operation::FsRead => "fs.read",
            Operation::FsWrite => "fs.write",
            Operation::FsDelete => "fs.delete",
            Operation::FsMove => "fs.move",
            Operation::ExecRun => "exec.run",
            Operation::Unknown(s) => s.as_str(),
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "fs.list" => Operation::FsList,
            "fs.read" => Operation::FsRead,
            "fs.write" => Operation::FsWrite,
            "fs.delete" => Operation::FsDelete,
            "fs.move" => Operation::FsMove,
            "exec.run" => Operation::ExecRun,
            other => Operation::Unknown(other.to_string()),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Operation::Unknown(_))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Operation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Operation::parse(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_operations_round_trip() {
        for op in [
            Operation::FsList,
            Operation::FsRead,
            Operation::FsWrite,
            Operation::FsDelete,
            Operation::FsMove,
            Operation::ExecRun,
        ] {
            let s = op.as_str().to_string();
            assert_eq!(Operation::parse(&s), op);
        }
    }

    #[test]
    fn reserved_names_parse_as_unknown() {
        assert_eq!(Operation::parse("fs.copy"), Operation::Unknown("fs.copy".into()));
        assert_eq!(Operation::parse("fs.create"), Operation::Unknown("fs.create".into()));
        assert!(!Operation::parse("fs.copy").is_known());
    }

    #[test]
    fn serde_round_trip_via_json() {
        let json = serde_json::to_string(&Operation::ExecRun).unwrap();
        assert_eq!(json, "\"exec.run\"");
        let back: Operation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Operation::ExecRun);
    }
}
