//! Audit API Handlers

use axum::extract::{Path, Query, State};
use serde::Deserialize;
use shared::models::{AuditChainVerification, EditionEvent};

use crate::api::{ApiResponse, AppResult};
use crate::core::ServerState;

/// 分页上限
const MAX_PAGE_SIZE: usize = 1000;

/// GET /api/audit/line-items/{id}
pub async fn by_line_item(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Vec<EditionEvent>>> {
    Ok(ApiResponse::success(state.audit.events_for_line_item(&id)?))
}

/// GET /api/audit/products/{id}
pub async fn by_product(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Vec<EditionEvent>>> {
    Ok(ApiResponse::success(state.audit.events_for_product(&id)?))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub since: u64,
    pub limit: Option<usize>,
}

/// GET /api/audit/events?since=&limit= — 按序列号分页
pub async fn events_since(
    State(state): State<ServerState>,
    Query(query): Query<EventsQuery>,
) -> AppResult<ApiResponse<Vec<EditionEvent>>> {
    let limit = query.limit.unwrap_or(100).clamp(1, MAX_PAGE_SIZE);
    Ok(ApiResponse::success(state.audit.events_since(query.since, limit)?))
}

/// GET /api/audit/verify — 验证哈希链
pub async fn verify_chain(
    State(state): State<ServerState>,
) -> AppResult<ApiResponse<AuditChainVerification>> {
    Ok(ApiResponse::success(state.audit.verify_chain()?))
}
