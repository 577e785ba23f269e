//! Unified error codes for the edition ledger
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 4xxx: Order / line-item input errors
//! - 5xxx: Edition numbering errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Validation failed
    ValidationFailed = 2,

    // ==================== 4xxx: Orders ====================
    /// Order payload is missing required fields
    MalformedOrder = 4002,
    /// Line item not found
    LineItemNotFound = 4101,

    // ==================== 5xxx: Editions ====================
    /// Edition reassignment failed, previous numbering kept
    ReassignmentFailed = 5001,
    /// No manual override present on the line item
    OverrideNotFound = 5002,
    /// Product has no line items
    ProductNotFound = 5003,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Stored data can no longer be decoded
    StorageCorrupted = 9403,
    /// System busy, retry later
    SystemBusy = 9404,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the default message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            ErrorCode::Success => "Success",
            ErrorCode::ValidationFailed => "Validation failed",

            ErrorCode::MalformedOrder => "Order payload is malformed",
            ErrorCode::LineItemNotFound => "Line item not found",

            ErrorCode::ReassignmentFailed => "Edition reassignment failed",
            ErrorCode::OverrideNotFound => "No manual override on line item",
            ErrorCode::ProductNotFound => "Product not found",

            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::StorageCorrupted => "Storage corrupted",
            ErrorCode::SystemBusy => "System busy",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code as u16
    }
}

/// Error returned when converting an unknown u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            2 => Ok(ErrorCode::ValidationFailed),

            // Orders
            4002 => Ok(ErrorCode::MalformedOrder),
            4101 => Ok(ErrorCode::LineItemNotFound),

            // Editions
            5001 => Ok(ErrorCode::ReassignmentFailed),
            5002 => Ok(ErrorCode::OverrideNotFound),
            5003 => Ok(ErrorCode::ProductNotFound),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9403 => Ok(ErrorCode::StorageCorrupted),
            9404 => Ok(ErrorCode::SystemBusy),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
