//! 课表 API 模块
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/schedules/{branch}/{date} | GET/PUT | 课表镜像 |
//! | /api/schedules/{branch}/{date}/resolve | GET | 解析签到时段 |
//! | /api/schedules/{branch}/{date}/corrections | POST | 追溯修正出勤记录 |

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/schedules", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/{branch_id}/{date}", get(handler::get).put(handler::replace))
        .route("/{branch_id}/{date}/resolve", get(handler::resolve))
        .route("/{branch_id}/{date}/corrections", post(handler::correct))
}
