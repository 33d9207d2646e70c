//! API 路由模块
//!
//! - [`health`] - 健康检查
//! - [`checkin`] - 终端签到、离线同步
//! - [`attendance`] - 出勤记录删除 (退还次数)
//! - [`schedules`] - 课表镜像、时段解析、追溯修正
//! - [`members`] - 会员目录同步
//! - [`pending`] - 死信队列

pub mod attendance;
pub mod checkin;
pub mod health;
pub mod members;
pub mod pending;
pub mod schedules;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::ServerState;

pub use crate::utils::{AppResponse, AppResult};

/// Build a router with all routes registered (no middleware, no state)
pub fn build_router() -> Router<ServerState> {
    Router::new()
        .merge(health::router())
        .merge(checkin::router())
        .merge(attendance::router())
        .merge(schedules::router())
        .merge(members::router())
        .merge(pending::router())
}

/// Build the fully configured application
///
/// Used by the HTTP server and by oneshot calls in tests.
pub fn build_app(state: ServerState) -> Router {
    build_router()
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
