//! 离线队列 / 死信 API 模块

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/pending", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(handler::list))
        .route("/dead-letters", get(handler::list_dead_letters))
        .route("/dead-letters/requeue", post(handler::requeue_dead_letters))
}
