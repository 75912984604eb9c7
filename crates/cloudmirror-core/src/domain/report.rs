//! Per-cycle summary

use serde::{Deserialize, Serialize};

/// Counters for one scan-and-sync cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Files created remotely
    pub uploaded: u32,
    /// Files whose remote content was replaced
    pub updated: u32,
    /// Files whose fingerprint matched the last sync
    pub skipped: u32,
    /// Files that could not be read or synced this cycle
    pub failed: u32,
    /// One message per failed file
    pub errors: Vec<String>,
    /// Wall-clock duration of the cycle in milliseconds
    pub duration_ms: u64,
    /// The cycle stopped early because shutdown was requested
    pub cancelled: bool,
}

impl CycleReport {
    /// Files that were examined
    pub fn total(&self) -> u32 {
        self.uploaded + self.updated + self.skipped + self.failed
    }

    /// True if the cycle made any remote change
    pub fn changed_anything(&self) -> bool {
        self.uploaded > 0 || self.updated > 0
    }

    pub fn record_failure(&mut self, message: String) {
        self.failed += 1;
        self.errors.push(message);
    }
}
