//! 审计追踪 API（只读）

mod handler;

use axum::{Router, routing::get};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/audit", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/events", get(handler::events_since))
        .route("/line-items/{id}", get(handler::by_line_item))
        .route("/products/{id}", get(handler::by_product))
        .route("/verify", get(handler::verify_chain))
}
