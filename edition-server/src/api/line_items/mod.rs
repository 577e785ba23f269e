//! 行项目查询与手动覆盖 API

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/line-items", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/{id}", get(handler::get_by_id))
        .route(
            "/{id}/override",
            post(handler::set_override).delete(handler::clear_override),
        )
}
