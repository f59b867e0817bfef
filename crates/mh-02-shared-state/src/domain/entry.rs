//! # Shared State Entry

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{ModuleName, Timestamp, SYSTEM_OWNER};

/// One key of the shared table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedStateEntry {
    pub key: String,
    pub value: Value,
    /// Module that last wrote the key, or `"system"`.
    pub owner: ModuleName,
    /// Last write time (milliseconds).
    pub timestamp: Timestamp,
    /// Persisted across restarts and exempt from the stale sweep.
    #[serde(default)]
    pub persistent: bool,
}

impl SharedStateEntry {
    /// Stale once older than `max_age_ms`. Persistent entries never are.
    pub fn is_stale(&self, now: Timestamp, max_age_ms: u64) -> bool {
        !self.persistent && now.saturating_sub(self.timestamp) > max_age_ms
    }
}

/// Only the owner or the system identity may delete an entry.
pub fn can_delete(entry: &SharedStateEntry, requester: &str) -> bool {
    requester == SYSTEM_OWNER || entry.owner == requester
}
