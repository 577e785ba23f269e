//! Product API Handlers

use axum::{
    extract::{Path, State},
    http::HeaderMap,
};
use shared::error::ErrorCode;
use shared::models::LineItemRecord;

use crate::api::{ApiResponse, AppError, AppResult, actor_from};
use crate::core::ServerState;
use crate::editions::{AssignError, AssignmentResult, edition_order};
use crate::ledger::StorageError;

/// GET /api/products/{id}/line-items — 按版本顺序列出
pub async fn line_items(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Vec<LineItemRecord>>> {
    let mut items = state.storage.line_items_for_product(&id)?;
    if items.is_empty() {
        return Err(product_not_found(&id));
    }
    items.sort_by(edition_order);
    Ok(ApiResponse::success(items))
}

/// POST /api/products/{id}/reassign — 触发重排
///
/// 存储失败时事务已回滚，原有编号保持不变
pub async fn reassign(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AppResult<ApiResponse<AssignmentResult>> {
    if state.storage.line_items_for_product(&id)?.is_empty() {
        return Err(product_not_found(&id));
    }
    let actor = actor_from(&headers);
    let result = state
        .assigner
        .reassign(&id, &actor)
        .await
        .map_err(|e| reassign_error(&id, e))?;
    Ok(ApiResponse::success(result))
}

fn product_not_found(product_id: &str) -> AppError {
    AppError::with_message(
        ErrorCode::ProductNotFound,
        format!("Product {product_id} has no line items"),
    )
    .with_detail("product_id", product_id)
}

fn reassign_error(product_id: &str, err: AssignError) -> AppError {
    match err {
        AssignError::Storage(StorageError::Serialization(e)) => {
            StorageError::Serialization(e).into()
        }
        AssignError::Storage(e) => {
            tracing::error!(product_id = %product_id, error = %e, "Reassignment failed");
            AppError::with_message(ErrorCode::ReassignmentFailed, e.to_string())
                .with_detail("product_id", product_id)
        }
        other => other.into(),
    }
}
