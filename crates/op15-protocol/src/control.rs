//! Control messages carried over the same channel as
//! Request/Response but not correlated by `id`.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use op15_domain::fsindex::FsIndex;
use op15_domain::permissions::{Capability, Mode, PlanStep};
use op15_domain::session::Platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    /// agent → cloud, once per session, immediately after channel open.
    #[serde(rename = "agent-metadata")]
    AgentMetadata {
        #[serde(rename = "userId")]
        user_id: String,
        #[serde(rename = "homeDirectory")]
        home_directory: PathBuf,
        platform: Platform,
        #[serde(rename = "filesystemIndex")]
        filesystem_index: FsIndex,
    },
    /// cloud → agent, ack of `agent-metadata`.
    Connected {
        #[serde(rename = "userId")]
        user_id: String,
    },
    /// either direction, heartbeat.
    Ping { timestamp: i64 },
    /// either direction, heartbeat reply.
    Pong { timestamp: i64 },
    /// either direction; authoritative from cloud for permission updates.
    #[serde(rename = "plan-approve")]
    PlanApprove {
        mode: Mode,
        #[serde(rename = "allowedDirectories")]
        allowed_directories: Vec<PathBuf>,
        #[serde(rename = "allowedOperations")]
        allowed_operations: BTreeSet<Capability>,
        #[serde(rename = "approvedPlan", default, skip_serializing_if = "Option::is_none")]
        approved_plan: Option<Vec<PlanStep>>,
    },
    /// agent → cloud, ack of a `plan-approve`.
    #[serde(rename = "plan-approved")]
    PlanApproved { success: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_round_trips() {
        let msg = ControlMessage::Ping { timestamp: 1234 };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"ping\""));
        let back: ControlMessage = serde_json::from_str(&json).unwrap();
        matches!(back, ControlMessage::Ping { timestamp: 1234 });
    }

    #[test]
    fn plan_approve_round_trips_with_optional_plan() {
        let msg = ControlMessage::PlanApprove {
            mode: Mode::Balanced,
            allowed_directories: vec![PathBuf::from("/home/u/projects")],
            allowed_operations: BTreeSet::from([Capability::Read, Capability::Write]),
            approved_plan: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"plan-approve\""));
        assert!(!json.contains("approvedPlan"));
        let back: ControlMessage = serde_json::from_str(&json).unwrap();
        match back {
            ControlMessage::PlanApprove { mode, .. } => assert_eq!(mode, Mode::Balanced),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn connected_uses_camel_case_user_id() {
        let msg = ControlMessage::Connected {
            user_id: "u1".into(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"userId\":\"u1\""));
    }
}
