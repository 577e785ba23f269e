//! Integrity API Handlers

use axum::extract::{Query, State};
use shared::models::{IntegrityReport, ValidationScope};

use crate::api::{ApiResponse, AppResult};
use crate::core::ServerState;

/// GET /api/integrity?product_id=&email= — 只读检查报告
pub async fn validate(
    State(state): State<ServerState>,
    Query(query): Query<IntegrityQuery>,
) -> AppResult<ApiResponse<IntegrityReport>> {
    let scope = ValidationScope {
        product_id: query.product_id.filter(|s| !s.trim().is_empty()),
        collector_email: query.email.filter(|s| !s.trim().is_empty()),
    };
    Ok(ApiResponse::success(state.integrity.validate(&scope)?))
}

#[derive(Debug, serde::Deserialize)]
pub struct IntegrityQuery {
    pub product_id: Option<String>,
    pub email: Option<String>,
}
