//! Append-only edition audit events

use serde::{Deserialize, Serialize};

/// Kind of edition event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditionEventType {
    /// Edition number assigned, renumbered or cleared
    Assignment,
    /// Effective status changed (including the first classification)
    StatusChanged,
    /// Owner email changed on a line item
    OwnershipTransfer,
    /// Operator pinned or released a status
    ManualOverride,
}

impl std::fmt::Display for EditionEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Assignment => "assignment",
            Self::StatusChanged => "status_changed",
            Self::OwnershipTransfer => "ownership_transfer",
            Self::ManualOverride => "manual_override",
        };
        f.write_str(s)
    }
}

/// Event not yet appended (no sequence, no hashes)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEditionEvent {
    pub line_item_id: String,
    pub product_id: String,
    pub edition_number: Option<u32>,
    pub event_type: EditionEventType,
    /// Structured reason / before / after
    pub event_data: serde_json::Value,
    pub actor: String,
}

/// Stored audit event (immutable)
///
/// - `prev_hash`: hash of the previous event (`genesis` for the first)
/// - `curr_hash`: SHA-256 over `prev_hash` and every stored field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditionEvent {
    /// Global, gap-free sequence number
    pub sequence: u64,
    pub line_item_id: String,
    pub product_id: String,
    pub edition_number: Option<u32>,
    pub event_type: EditionEventType,
    pub event_data: serde_json::Value,
    pub actor: String,
    /// Unix millis
    pub timestamp: i64,
    pub prev_hash: String,
    pub curr_hash: String,
}

/// Result of re-walking the audit hash chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditChainVerification {
    pub total_events: u64,
    pub chain_intact: bool,
    pub breaks: Vec<AuditChainBreak>,
}

/// Break point in the audit chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditChainBreak {
    pub sequence: u64,
    pub reason: String,
}
