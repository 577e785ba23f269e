//! Collector API Handlers

use axum::extract::{Query, State};
use serde::Deserialize;
use shared::models::{CollectorIdentity, LineItemRecord};

use crate::api::{ApiResponse, AppError, AppResult};
use crate::core::ServerState;

#[derive(Debug, Deserialize)]
pub struct EditionsQuery {
    pub email: Option<String>,
    pub customer_id: Option<String>,
}

/// GET /api/collectors/editions?email=|customer_id= — 藏家当前持有的版本
pub async fn editions(
    State(state): State<ServerState>,
    Query(query): Query<EditionsQuery>,
) -> AppResult<ApiResponse<Vec<LineItemRecord>>> {
    let identity = match (query.email, query.customer_id) {
        (Some(email), _) if !email.trim().is_empty() => CollectorIdentity::Email(email),
        (_, Some(id)) if !id.trim().is_empty() => CollectorIdentity::CustomerId(id),
        _ => {
            return Err(AppError::validation("email or customer_id is required"));
        }
    };
    let items = state.collector.editions_for(&identity)?;
    Ok(ApiResponse::success(items))
}
