//! Append-only, ring-buffered action log: one entry per dispatched
//! operation (or denial), capped at 1000 entries per agent. A
//! `parking_lot::RwLock` around a bounded `VecDeque` — write-many,
//! read-rare.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

const CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionOutcome {
    Success,
    Error,
    Denied,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub result: ActionOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Ring buffer of the most recent [`CAPACITY`] entries, guarded for
/// concurrent write-many/read-rare access.
pub struct ActionLog {
    entries: RwLock<VecDeque<ActionLogEntry>>,
}

impl Default for ActionLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionLog {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(CAPACITY)),
        }
    }

    pub fn push(&self, entry: ActionLogEntry) {
        let mut entries = self.entries.write();
        if entries.len() >= CAPACITY {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Most recent `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<ActionLogEntry> {
        let entries = self.entries.read();
        entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn total(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(op: &str) -> ActionLogEntry {
        ActionLogEntry {
            timestamp: Utc::now(),
            user_id: "u1".into(),
            operation: op.into(),
            path: None,
            command: None,
            result: ActionOutcome::Success,
            details: None,
        }
    }

    #[test]
    fn recent_returns_newest_first() {
        let log = ActionLog::new();
        log.push(entry("fs.list"));
        log.push(entry("fs.read"));
        let recent = log.recent(10);
        assert_eq!(recent[0].operation, "fs.read");
        assert_eq!(recent[1].operation, "fs.list");
    }

    #[test]
    fn ring_buffer_caps_at_capacity() {
        let log = ActionLog::new();
        for i in 0..(CAPACITY + 10) {
            log.push(entry(&format!("op-{i}")));
        }
        assert_eq!(log.total(), CAPACITY);
        let recent = log.recent(1);
        assert_eq!(recent[0].operation, format!("op-{}", CAPACITY + 9));
    }
}
