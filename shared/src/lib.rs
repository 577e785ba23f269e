//! Shared types for the edition ledger
//!
//! Data model types used across crates: upstream order payloads, warehouse
//! records, persisted line items, edition events, and the unified error system.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};

pub use error::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};
