//! Line Item API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use serde::Deserialize;
use shared::models::{LineItemRecord, LineItemStatus};

use crate::api::{ApiResponse, AppError, AppResult, actor_from};
use crate::core::ServerState;
use crate::editions::AssignmentResult;

/// GET /api/line-items/{id} — 状态 / 版本号 / owner
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<LineItemRecord>> {
    let record = state
        .storage
        .get_line_item(&id)?
        .ok_or_else(|| AppError::line_item_not_found(&id))?;
    Ok(ApiResponse::success(record))
}

#[derive(Debug, Deserialize)]
pub struct OverrideRequest {
    pub status: LineItemStatus,
    pub reason: String,
}

/// POST /api/line-items/{id}/override — 手动指定状态
pub async fn set_override(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<OverrideRequest>,
) -> AppResult<ApiResponse<AssignmentResult>> {
    let actor = actor_from(&headers);
    let result = state
        .assigner
        .override_status(&id, req.status, &req.reason, &actor)
        .await?;
    Ok(ApiResponse::success(result))
}

/// DELETE /api/line-items/{id}/override — 清除手动覆盖
pub async fn clear_override(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AppResult<ApiResponse<AssignmentResult>> {
    let actor = actor_from(&headers);
    let result = state.assigner.clear_override(&id, &actor).await?;
    Ok(ApiResponse::success(result))
}
