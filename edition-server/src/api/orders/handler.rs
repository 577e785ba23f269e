//! Order Sync API Handlers

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use serde_json::Value;

use crate::api::{ApiResponse, AppResult, actor_from};
use crate::core::ServerState;
use crate::sync::SyncReport;

/// POST /api/orders/sync — 立即处理一个订单 payload
pub async fn sync(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> AppResult<ApiResponse<SyncReport>> {
    let actor = actor_from(&headers);
    let report = state.sync.process_order(payload, &actor).await?;
    Ok(ApiResponse::success(report))
}

/// POST /api/orders/enqueue — 放入后台同步队列
pub async fn enqueue(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> AppResult<(StatusCode, ApiResponse<()>)> {
    let actor = actor_from(&headers);
    state.sync_queue.enqueue(payload, actor)?;
    Ok((StatusCode::ACCEPTED, ApiResponse::ok()))
}
