//! 健康检查路由
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /health | GET | 简单健康检查 |
//! | /health/detailed | GET | 存储、离线队列、死信状态 |
//!
//! `degraded_writes > 0` 或 `local_pending > 0` 表示有签到只保存在内存中，
//! 需要运维关注。

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use std::time::SystemTime;

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/detailed", get(detailed_health))
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
pub struct DetailedHealthResponse {
    status: &'static str,
    version: &'static str,
    /// 运行时间 (秒)
    uptime_seconds: u64,
    venue_tz: String,
    checks: HealthChecks,
    queue: QueueStats,
}

#[derive(Serialize)]
pub struct HealthChecks {
    database: CheckResult,
}

#[derive(Serialize)]
pub struct QueueStats {
    /// 两级队列中待同步的签到
    pending: usize,
    /// 仅在内存中的签到 (非持久)
    local_pending: usize,
    dead_letters: u64,
    /// 启动以来降级到内存队列的次数
    degraded_writes: u64,
    cached_members: usize,
}

/// 单项检查结果
#[derive(Serialize)]
pub struct CheckResult {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl CheckResult {
    fn ok_with_latency(latency_ms: u64) -> Self {
        Self {
            status: "ok",
            latency_ms: Some(latency_ms),
            message: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            latency_ms: None,
            message: Some(message.into()),
        }
    }
}

// 服务器启动时间 (懒加载静态变量)
static START_TIME: std::sync::OnceLock<SystemTime> = std::sync::OnceLock::new();

fn get_uptime_seconds() -> u64 {
    let start = START_TIME.get_or_init(SystemTime::now);
    SystemTime::now()
        .duration_since(*start)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// GET /health - 基础健康检查
pub async fn health() -> Json<HealthResponse> {
    START_TIME.get_or_init(SystemTime::now);
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /health/detailed - 包含组件状态的详细健康检查
pub async fn detailed_health(State(state): State<ServerState>) -> Json<DetailedHealthResponse> {
    let db_start = std::time::Instant::now();
    let (db_check, dead_letters) = match state.storage.dead_letter_count() {
        Ok(n) => (CheckResult::ok_with_latency(db_start.elapsed().as_millis() as u64), n),
        Err(e) => (CheckResult::error(format!("Storage error: {}", e)), 0),
    };

    let queue = QueueStats {
        pending: state.offline.pending_len(),
        local_pending: state.offline.local().len(),
        dead_letters,
        degraded_writes: state.offline.degraded_writes(),
        cached_members: state.cache.len(),
    };

    let healthy = db_check.status == "ok" && queue.local_pending == 0 && queue.dead_letters == 0;

    Json(DetailedHealthResponse {
        status: if healthy { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: get_uptime_seconds(),
        venue_tz: state.config.venue_tz.to_string(),
        checks: HealthChecks { database: db_check },
        queue,
    })
}
