//! API 路由模块（对账引擎的薄 HTTP 适配层）
//!
//! | 模块 | 路径 |
//! |------|------|
//! | [`health`] | `/health` |
//! | [`orders`] | `/api/orders/*` |
//! | [`line_items`] | `/api/line-items/*` |
//! | [`products`] | `/api/products/*` |
//! | [`collectors`] | `/api/collectors/*` |
//! | [`audit`] | `/api/audit/*` |
//! | [`integrity`] | `/api/integrity` |
//!
//! 认证不在本层处理。

pub mod audit;
pub mod collectors;
pub mod health;
pub mod integrity;
pub mod line_items;
pub mod orders;
pub mod products;

use axum::Router;
use http::HeaderMap;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::ServerState;

pub use crate::utils::{ApiResponse, AppError, AppResult};

/// 操作人请求头
pub const ACTOR_HEADER: &str = "x-actor";

/// 未提供操作人时的默认值
pub const DEFAULT_ACTOR: &str = "api";

/// 组装完整路由
pub fn build_app(state: ServerState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(orders::router())
        .merge(line_items::router())
        .merge(products::router())
        .merge(collectors::router())
        .merge(audit::router())
        .merge(integrity::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// 从请求头读取操作人
pub fn actor_from(headers: &HeaderMap) -> String {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_ACTOR)
        .to_string()
}
