//! 会员 API 模块
//!
//! 会员目录由外部系统维护，这里只接收同步写入和查询。

mod handler;

use axum::{Router, routing::get};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/members", routes())
}

fn routes() -> Router<ServerState> {
    Router::new().route("/{id}", get(handler::get_by_id).put(handler::upsert))
}
