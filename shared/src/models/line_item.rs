//! Persisted line-item state

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::identity::ResolvedIdentity;

/// Whether a line item counts toward its product's editions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineItemStatus {
    Active,
    Inactive,
}

impl LineItemStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for LineItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Inactive => f.write_str("inactive"),
        }
    }
}

/// Verdict of the status classifier plus the signals behind it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub status: LineItemStatus,
    pub is_refunded: bool,
    pub is_restocked: bool,
    pub is_removed_by_property: bool,
    pub is_removed_by_qty: bool,
    pub is_cancelled: bool,
    pub is_fulfilled: bool,
    pub is_paid: bool,
}

impl Classification {
    /// Refund or restock signal present (the validator's critical divergence)
    pub fn has_refund_signal(&self) -> bool {
        self.is_refunded || self.is_restocked
    }

    /// Names of the signals that force the item inactive
    pub fn reasons(&self) -> Vec<&'static str> {
        let mut reasons = Vec::new();
        if self.is_refunded {
            reasons.push("refunded");
        }
        if self.is_restocked {
            reasons.push("restocked");
        }
        if self.is_removed_by_property {
            reasons.push("removed_by_property");
        }
        if self.is_removed_by_qty {
            reasons.push("removed_by_quantity");
        }
        if self.is_cancelled {
            reasons.push("order_cancelled");
        }
        if reasons.is_empty() && !self.status.is_active() {
            reasons.push("unpaid_unfulfilled");
        }
        reasons
    }
}

/// Operator pin of a line item's status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusOverride {
    pub status: LineItemStatus,
    pub reason: String,
    pub actor: String,
    /// Unix millis
    pub at: i64,
}

/// One persisted line item
///
/// `status` is the effective status: the manual override when present, the
/// classifier's verdict otherwise. Edition fields are owned by the assigner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemRecord {
    pub line_item_id: String,
    pub order_id: String,
    pub order_name: Option<String>,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub sku: Option<String>,
    pub title: Option<String>,
    pub vendor: Option<String>,
    pub quantity: i64,
    pub price: Option<Decimal>,
    pub fulfillable_quantity: Option<i64>,
    pub fulfillment_status: Option<String>,
    pub refunded_quantity: i64,
    pub classification: Classification,
    pub status: LineItemStatus,
    #[serde(default)]
    pub status_override: Option<StatusOverride>,
    pub edition_number: Option<u32>,
    pub edition_total: Option<u32>,
    pub owner: ResolvedIdentity,
    /// Last effective status recorded in the audit trail
    #[serde(default)]
    pub audited_status: Option<LineItemStatus>,
    /// Last owner email recorded in the audit trail
    #[serde(default)]
    pub audited_owner: Option<String>,
    /// Order-derived creation time (Unix millis), the assigner's primary sort key
    pub created_at: i64,
    pub updated_at: i64,
}

impl LineItemRecord {
    /// Effective status given an optional override
    pub fn effective_status(
        classification: &Classification,
        status_override: Option<&StatusOverride>,
    ) -> LineItemStatus {
        status_override
            .map(|o| o.status)
            .unwrap_or(classification.status)
    }

    /// Equal in everything except the bookkeeping timestamp
    pub fn same_content(&self, other: &Self) -> bool {
        let mut a = self.clone();
        a.updated_at = other.updated_at;
        a == *other
    }

    /// "#N of T" label shown to collectors
    pub fn edition_label(&self) -> Option<String> {
        match (self.edition_number, self.edition_total) {
            (Some(n), Some(t)) => Some(format!("#{n} of {t}")),
            _ => None,
        }
    }
}

/// Compare two line-item ids without numeric parsing
///
/// Shorter ids sort first, equal lengths compare lexicographically. For the
/// all-digit ids upstream platforms emit this matches numeric order without
/// ever converting through a float.
pub fn compare_line_item_ids(a: &str, b: &str) -> std::cmp::Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn test_compare_ids_numeric_like() {
        assert_eq!(compare_line_item_ids("9", "10"), Ordering::Less);
        assert_eq!(compare_line_item_ids("100", "99"), Ordering::Greater);
        assert_eq!(compare_line_item_ids("42", "42"), Ordering::Equal);
        assert_eq!(
            compare_line_item_ids("9007199254740993", "9007199254740992"),
            Ordering::Greater
        );
    }

    #[test]
    fn test_reasons_for_unpaid() {
        let c = Classification {
            status: LineItemStatus::Inactive,
            is_refunded: false,
            is_restocked: false,
            is_removed_by_property: false,
            is_removed_by_qty: false,
            is_cancelled: false,
            is_fulfilled: false,
            is_paid: false,
        };
        assert_eq!(c.reasons(), vec!["unpaid_unfulfilled"]);
    }
}
