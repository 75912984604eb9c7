//! Actions taken during sync cycles
//!
//! Each cycle returns its own [`SessionLog`]; a long-running process keeps a
//! running log by appending each cycle's entries with [`SessionLog::extend`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::RelativePath;

/// What happened to a file during a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionAction {
    /// The file was created remotely
    Uploaded,
    /// The remote file's content was replaced
    Updated,
}

impl std::fmt::Display for SessionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionAction::Uploaded => write!(f, "uploaded"),
            SessionAction::Updated => write!(f, "updated"),
        }
    }
}

/// One line of the session log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub relative_path: RelativePath,
    pub action: SessionAction,
    pub timestamp: DateTime<Utc>,
}

/// Ordered list of actions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLog {
    entries: Vec<SessionEntry>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action stamped with the current time
    pub fn record(&mut self, relative_path: RelativePath, action: SessionAction) {
        self.entries.push(SessionEntry {
            relative_path,
            action,
            timestamp: Utc::now(),
        });
    }

    /// Append all entries of another log, preserving order
    pub fn extend(&mut self, other: SessionLog) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[SessionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries with the given action
    pub fn count(&self, action: SessionAction) -> usize {
        self.entries.iter().filter(|e| e.action == action).count()
    }
}
