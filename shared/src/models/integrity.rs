//! Integrity validation report types

use serde::{Deserialize, Serialize};

/// Issue severity, in increasing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Warning,
    Error,
    Critical,
}

/// What invariant an issue violates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Active line item with a refund or restock signal
    ActiveWithRefundSignal,
    /// Active line item whose order is refunded, voided or cancelled
    ActiveOnInactiveOrder,
    /// Two or more active items share an edition number
    DuplicateEditionNumber,
    /// Active numbering is not {1..N}
    NumberingGap,
    /// Active line item without an edition number
    MissingEditionNumber,
    /// Inactive line item still holding an edition number
    InactiveHoldsEditionNumber,
    /// edition_total differs from the active count
    EditionTotalMismatch,
    /// Stored status differs from re-classification
    StatusDiverged,
    /// Line item references an order the ledger does not have
    OrderMissing,
}

/// One finding for operator remediation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityIssue {
    pub kind: IssueKind,
    pub severity: IssueSeverity,
    pub product_id: String,
    pub line_item_ids: Vec<String>,
    pub order_id: Option<String>,
    pub edition_number: Option<u32>,
    pub message: String,
}

/// Validation scope; both filters empty means the whole ledger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationScope {
    pub product_id: Option<String>,
    pub collector_email: Option<String>,
}

/// Full validation report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub scope: ValidationScope,
    pub products_scanned: usize,
    pub line_items_scanned: usize,
    pub issues: Vec<IntegrityIssue>,
    /// Unix millis
    pub generated_at: i64,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn count(&self, severity: IssueSeverity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }
}
