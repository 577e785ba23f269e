//! Upstream commerce platform payloads
//!
//! These shapes are consumed as untrusted input: every field is optional and
//! tolerant of type drift. Required-field checks happen in the sync pipeline.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::serde_helpers::{id_string, lenient_datetime, lenient_i64};

/// Order as reported by the commerce platform
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderPayload {
    #[serde(default, deserialize_with = "id_string")]
    pub id: Option<String>,
    /// Human-readable order name (e.g. "#1042")
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub cancelled_at: Option<DateTime<Utc>>,
    /// paid / authorized / pending / partially_paid / refunded / voided / ...
    #[serde(default)]
    pub financial_status: Option<String>,
    #[serde(default)]
    pub fulfillment_status: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub customer: Option<CustomerPayload>,
    #[serde(default)]
    pub shipping_address: Option<AddressPayload>,
    #[serde(default)]
    pub billing_address: Option<AddressPayload>,
    #[serde(default)]
    pub line_items: Vec<LineItemPayload>,
    #[serde(default)]
    pub refunds: Vec<RefundPayload>,
}

impl OrderPayload {
    /// Lower-cased financial status
    pub fn financial_status(&self) -> Option<String> {
        normalized(self.financial_status.as_deref())
    }

    /// Lower-cased fulfillment status
    pub fn fulfillment_status(&self) -> Option<String> {
        normalized(self.fulfillment_status.as_deref())
    }

    /// The date the warehouse lookup window is centred on
    pub fn reference_date(&self) -> Option<DateTime<Utc>> {
        self.processed_at.or(self.created_at)
    }

    /// Whether the order as a whole is cancelled or voided
    pub fn is_cancelled(&self) -> bool {
        self.cancelled_at.is_some()
            || self.financial_status().as_deref() == Some("voided")
            || matches!(
                self.fulfillment_status().as_deref(),
                Some("canceled") | Some("cancelled")
            )
    }

    /// Find the refund entry for a line item, comparing ids as strings
    pub fn refund_entry_for(&self, line_item_id: &str) -> Option<&RefundLineItemPayload> {
        self.refunds
            .iter()
            .flat_map(|r| r.refund_line_items.iter())
            .find(|rli| rli.line_item_id.as_deref() == Some(line_item_id))
    }

    /// Ids of every line item that appears in a refund entry
    pub fn refunded_line_item_ids(&self) -> BTreeSet<&str> {
        self.refunds
            .iter()
            .flat_map(|r| r.refund_line_items.iter())
            .filter_map(|rli| rli.line_item_id.as_deref())
            .collect()
    }
}

/// Buyer record attached to an order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerPayload {
    #[serde(default, deserialize_with = "id_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Shipping or billing address
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address1: Option<String>,
    #[serde(default)]
    pub address2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default, alias = "province_code")]
    pub province: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default, alias = "country_code")]
    pub country: Option<String>,
}

/// One purchased line within an order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItemPayload {
    #[serde(default, deserialize_with = "id_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "id_string")]
    pub product_id: Option<String>,
    #[serde(default, deserialize_with = "id_string")]
    pub variant_id: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub fulfillable_quantity: Option<i64>,
    #[serde(default)]
    pub fulfillment_status: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub refunded_quantity: Option<i64>,
    /// Per-item refund status some feeds attach directly to the line item
    #[serde(default)]
    pub refund_status: Option<String>,
    #[serde(default)]
    pub restocked: Option<bool>,
    #[serde(default)]
    pub restock_type: Option<String>,
    #[serde(default)]
    pub properties: Vec<PropertyPayload>,
}

impl LineItemPayload {
    /// Lower-cased fulfillment status
    pub fn fulfillment_status(&self) -> Option<String> {
        normalized(self.fulfillment_status.as_deref())
    }

    /// Look up a property by key (`name` or `key`), case-insensitive
    pub fn property(&self, key: &str) -> Option<&PropertyPayload> {
        self.properties
            .iter()
            .find(|p| p.key().is_some_and(|k| k.eq_ignore_ascii_case(key)))
    }
}

/// Custom line-item attribute; platforms disagree on `name` vs `key`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl PropertyPayload {
    pub fn key(&self) -> Option<&str> {
        self.name.as_deref().or(self.key.as_deref()).map(str::trim)
    }

    /// Truthiness of the property value
    ///
    /// `true`, non-zero numbers and any string other than
    /// `""`/`"false"`/`"0"`/`"no"`/`"null"` are truthy.
    pub fn is_truthy(&self) -> bool {
        match &self.value {
            serde_json::Value::Bool(b) => *b,
            serde_json::Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
            serde_json::Value::String(s) => {
                let s = s.trim().to_lowercase();
                !matches!(s.as_str(), "" | "false" | "0" | "no" | "null")
            }
            serde_json::Value::Null => false,
            serde_json::Value::Array(a) => !a.is_empty(),
            serde_json::Value::Object(o) => !o.is_empty(),
        }
    }
}

/// Refund record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefundPayload {
    #[serde(default, deserialize_with = "id_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub refund_line_items: Vec<RefundLineItemPayload>,
}

/// Line-item entry within a refund
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefundLineItemPayload {
    #[serde(default, deserialize_with = "id_string")]
    pub line_item_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub restock_type: Option<String>,
}

impl RefundLineItemPayload {
    /// `no_restock` (and an empty value) mean the unit was not put back on the shelf
    pub fn is_restock(&self) -> bool {
        normalized(self.restock_type.as_deref())
            .is_some_and(|t| t != "no_restock" && t != "none")
    }
}

fn normalized(raw: Option<&str>) -> Option<String> {
    raw.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty())
}
