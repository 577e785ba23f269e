//! Data model shared between the engine and its callers
//!
//! - [`order`]: commerce platform payloads (untrusted input)
//! - [`warehouse`]: warehouse provider records (PII fallback only)
//! - [`identity`]: resolved buyer identity
//! - [`line_item`]: persisted line-item state
//! - [`edition_event`]: append-only audit events
//! - [`integrity`]: validation report types

pub mod edition_event;
pub mod identity;
pub mod integrity;
pub mod line_item;
pub mod order;
pub mod serde_helpers;
pub mod warehouse;

use serde::{Deserialize, Serialize};

pub use edition_event::{
    AuditChainBreak, AuditChainVerification, EditionEvent, EditionEventType, NewEditionEvent,
};
pub use identity::{IdentitySource, PostalAddress, ResolvedIdentity};
pub use integrity::{IntegrityIssue, IntegrityReport, IssueKind, IssueSeverity, ValidationScope};
pub use line_item::{
    Classification, LineItemRecord, LineItemStatus, StatusOverride, compare_line_item_ids,
};
pub use order::{
    AddressPayload, CustomerPayload, LineItemPayload, OrderPayload, PropertyPayload,
    RefundLineItemPayload, RefundPayload,
};
pub use warehouse::{WarehouseOrder, WarehouseRecord, join_name};

/// Who is asking for their editions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CollectorIdentity {
    Email(String),
    CustomerId(String),
}
