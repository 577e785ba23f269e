//! 健康检查路由
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /health | GET | 健康检查 + 审计事件数 |

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().route("/health", get(health))
}

#[derive(Serialize)]
pub struct HealthResponse {
    /// ok | degraded
    status: &'static str,
    version: &'static str,
    /// 审计事件总数（存储不可读时为空）
    #[serde(skip_serializing_if = "Option::is_none")]
    audit_events: Option<u64>,
}

async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    let audit_events = match state.storage.event_count() {
        Ok(n) => Some(n),
        Err(e) => {
            tracing::error!("Health check storage read failed: {e}");
            None
        }
    };
    Json(HealthResponse {
        status: if audit_events.is_some() { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        audit_events,
    })
}
