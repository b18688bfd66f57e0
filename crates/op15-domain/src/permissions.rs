//! Session-scoped capability model enforced by the Permission Core.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Safe,
    Balanced,
    Unrestricted,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Safe
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Read,
    Write,
    Delete,
    Exec,
}

/// One step of a pre-approved plan. Identity equality is on `id`; args are
/// compared with subset semantics (`step.args ⊆ request.args`) per the
/// Open Question resolution recorded in SPEC_FULL.md / DESIGN.md.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanStep {
    pub id: String,
    pub operation: String,
    #[serde(default)]
    pub args: std::collections::BTreeMap<String, Value>,
}

impl PlanStep {
    /// True iff every key/value pair in `self.args` is present and equal
    /// in `request_args`. Extra keys on the request side are permitted.
    pub fn args_subset_of(&self, request_args: &std::collections::BTreeMap<String, Value>) -> bool {
        self.args
            .iter()
            .all(|(k, v)| request_args.get(k) == Some(v))
    }
}

/// Mutable per-session permission state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPermissions {
    pub mode: Mode,
    pub allowed_operations: BTreeSet<Capability>,
    pub allowed_directories: Vec<PathBuf>,
    pub approved_plan: Option<Vec<PlanStep>>,
    pub approved_step_cursor: usize,
}

impl Default for SessionPermissions {
    fn default() -> Self {
        Self {
            mode: Mode::Safe,
            allowed_operations: BTreeSet::from([Capability::Read]),
            allowed_directories: Vec::new(),
            approved_plan: None,
            approved_step_cursor: 0,
        }
    }
}

impl SessionPermissions {
    /// The plan step due next, if a plan is active and not yet exhausted.
    pub fn next_plan_step(&self) -> Option<&PlanStep> {
        self.approved_plan
            .as_ref()
            .and_then(|plan| plan.get(self.approved_step_cursor))
    }

    /// Advance the cursor after a step is consumed. The plan itself is
    /// NOT cleared once exhausted: `approved_step_cursor` is left at
    /// `plan.len()`, so `next_plan_step` returns `None` and any further
    /// operation is denied with `plan-violation` rather than falling
    /// through to the capability/scope check. A plan is one-shot in the
    /// sense that it never accepts another operation once exhausted, but
    /// it stays active (and thus still gates everything) until a new
    /// `plan-approve` or session supersede calls `clear_plan`.
    pub fn advance_plan(&mut self) {
        self.approved_step_cursor += 1;
    }

    /// Clear any active plan immediately (e.g. on supersede or explicit reset).
    pub fn clear_plan(&mut self) {
        self.approved_plan = None;
        self.approved_step_cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_safe_read_only() {
        let p = SessionPermissions::default();
        assert_eq!(p.mode, Mode::Safe);
        assert_eq!(p.allowed_operations, BTreeSet::from([Capability::Read]));
        assert!(p.allowed_directories.is_empty());
        assert!(p.approved_plan.is_none());
    }

    #[test]
    fn args_subset_allows_extra_request_keys() {
        let step = PlanStep {
            id: "a".into(),
            operation: "fs.read".into(),
            args: std::collections::BTreeMap::from([(
                "path".to_string(),
                Value::String("/home/u/README.md".into()),
            )]),
        };
        let mut req = std::collections::BTreeMap::new();
        req.insert("path".to_string(), Value::String("/home/u/README.md".into()));
        req.insert("encoding".to_string(), Value::String("utf8".into()));
        assert!(step.args_subset_of(&req));
    }

    #[test]
    fn args_subset_rejects_mismatched_value() {
        let step = PlanStep {
            id: "a".into(),
            operation: "fs.read".into(),
            args: std::collections::BTreeMap::from([(
                "path".to_string(),
                Value::String("/home/u/README.md".into()),
            )]),
        };
        let mut req = std::collections::BTreeMap::new();
        req.insert("path".to_string(), Value::String("/home/u/OTHER.md".into()));
        assert!(!step.args_subset_of(&req));
    }

    #[test]
    fn advance_plan_leaves_plan_active_but_exhausted_after_last_step() {
        let mut p = SessionPermissions {
            approved_plan: Some(vec![PlanStep {
                id: "a".into(),
                operation: "exec.run".into(),
                args: Default::default(),
            }]),
            ..Default::default()
        };
        p.advance_plan();
        assert!(p.approved_plan.is_some());
        assert_eq!(p.approved_step_cursor, 1);
        assert!(p.next_plan_step().is_none());
    }

    #[test]
    fn clear_plan_removes_plan_entirely() {
        let mut p = SessionPermissions {
            approved_plan: Some(vec![PlanStep {
                id: "a".into(),
                operation: "exec.run".into(),
                args: Default::default(),
            }]),
            approved_step_cursor: 1,
            ..Default::default()
        };
        p.clear_plan();
        assert!(p.approved_plan.is_none());
        assert_eq!(p.approved_step_cursor, 0);
    }
}
