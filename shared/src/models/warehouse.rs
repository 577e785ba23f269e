//! Warehouse fulfillment provider records
//!
//! Used only as a PII fallback, never for status or edition truth.

use serde::{Deserialize, Serialize};

use super::identity::PostalAddress;
use super::serde_helpers::id_string;

/// Order record as returned by the warehouse provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WarehouseOrder {
    /// The storefront order reference (usually the order name, sometimes the id)
    #[serde(default, deserialize_with = "id_string")]
    pub order_id: Option<String>,
    /// The warehouse's own order id
    #[serde(default, deserialize_with = "id_string")]
    pub sys_order_id: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub ship_email: Option<String>,
    #[serde(default)]
    pub ship_phone: Option<String>,
    #[serde(default)]
    pub ship_address1: Option<String>,
    #[serde(default)]
    pub ship_address2: Option<String>,
    #[serde(default)]
    pub ship_city: Option<String>,
    #[serde(default)]
    pub ship_state: Option<String>,
    #[serde(default)]
    pub ship_zip: Option<String>,
    #[serde(default)]
    pub ship_country: Option<String>,
}

impl WarehouseOrder {
    /// Whether this record refers to the given storefront order
    ///
    /// Order names are compared with and without the leading `#`.
    pub fn matches(&self, order_id: &str, order_name: Option<&str>) -> bool {
        let refs = [self.order_id.as_deref(), self.sys_order_id.as_deref()];
        refs.into_iter().flatten().any(|r| {
            let r = r.trim();
            r == order_id
                || order_name.is_some_and(|name| {
                    let name = name.trim();
                    r == name || r.trim_start_matches('#') == name.trim_start_matches('#')
                })
        })
    }

    pub fn shipping_name(&self) -> Option<String> {
        join_name(self.first_name.as_deref(), self.last_name.as_deref())
    }

    pub fn address(&self) -> PostalAddress {
        PostalAddress {
            line1: non_empty(self.ship_address1.as_deref()),
            line2: non_empty(self.ship_address2.as_deref()),
            city: non_empty(self.ship_city.as_deref()),
            region: non_empty(self.ship_state.as_deref()),
            postal_code: non_empty(self.ship_zip.as_deref()),
            country: non_empty(self.ship_country.as_deref()),
        }
    }
}

/// Cached warehouse snapshot keyed by the order identifiers it matched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseRecord {
    /// Keys the record was matched against (order id, order name)
    pub matched_keys: Vec<String>,
    pub shipping_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<PostalAddress>,
    /// Raw provider payload, retained for debugging
    pub raw: serde_json::Value,
    /// Unix millis of the last refresh
    pub refreshed_at: i64,
}

impl WarehouseRecord {
    pub fn from_order(order: &WarehouseOrder, matched_keys: Vec<String>, refreshed_at: i64) -> Self {
        let address = order.address();
        Self {
            matched_keys,
            shipping_name: order.shipping_name(),
            email: non_empty(order.ship_email.as_deref()),
            phone: non_empty(order.ship_phone.as_deref()),
            address: address.is_usable().then_some(address),
            raw: serde_json::to_value(order).unwrap_or(serde_json::Value::Null),
            refreshed_at,
        }
    }
}

/// Join first and last name, skipping blanks
pub fn join_name(first: Option<&str>, last: Option<&str>) -> Option<String> {
    let parts: Vec<&str> = [first, last]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}

pub(crate) fn non_empty(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}
