//! 订单同步 API

mod handler;

use axum::{Router, routing::post};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/orders", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/sync", post(handler::sync))
        .route("/enqueue", post(handler::enqueue))
}
