//! 商品版本号 API

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/products", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/{id}/line-items", get(handler::line_items))
        .route("/{id}/reassign", post(handler::reassign))
}
