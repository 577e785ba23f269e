//! Buyer identity resolved for a line item's owner

use serde::{Deserialize, Serialize};

/// Which tier of the fallback chain completed the identity
///
/// Ordered from most to least authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    /// Buyer fields on the order itself (email, customer record)
    OrderBuyer,
    /// Shipping or billing address on the order
    OrderAddress,
    /// Previously cached warehouse record
    WarehouseCache,
    /// Live query to the warehouse provider
    WarehouseLive,
    /// Nothing could be resolved
    Unresolved,
}

impl std::fmt::Display for IdentitySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::OrderBuyer => "order_buyer",
            Self::OrderAddress => "order_address",
            Self::WarehouseCache => "warehouse_cache",
            Self::WarehouseLive => "warehouse_live",
            Self::Unresolved => "unresolved",
        };
        f.write_str(s)
    }
}

/// Normalized postal address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl PostalAddress {
    /// An address without a street line is not useful for shipping or display
    pub fn is_usable(&self) -> bool {
        self.line1.as_deref().is_some_and(|l| !l.trim().is_empty())
    }
}

/// Best-effort buyer identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    pub email: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<PostalAddress>,
    /// Platform customer id, when the order carries one
    pub customer_id: Option<String>,
    pub source: IdentitySource,
}

impl ResolvedIdentity {
    pub fn unresolved() -> Self {
        Self {
            email: None,
            name: None,
            phone: None,
            address: None,
            customer_id: None,
            source: IdentitySource::Unresolved,
        }
    }

    /// Identity is complete once both email and name are known
    pub fn is_complete(&self) -> bool {
        self.email.is_some() && self.name.is_some()
    }

    /// Whether any field at all has been resolved
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.name.is_none() && self.phone.is_none() && self.address.is_none()
    }
}

impl Default for ResolvedIdentity {
    fn default() -> Self {
        Self::unresolved()
    }
}
