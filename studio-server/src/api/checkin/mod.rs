//! 签到 API 模块

mod handler;

use axum::{Router, routing::post};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/checkin", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", post(handler::check_in))
        .route("/sync", post(handler::sync_pending))
}
