//! Check-in API Handlers

use axum::{Json, extract::State};
use shared::{CheckInOutcome, CheckInRequest, SyncReport};

use crate::core::ServerState;
use crate::utils::{AppError, AppResponse, AppResult, ok};

/// POST /api/checkin - 终端签到
///
/// 在线失败时返回 `queued` 状态 (已进入离线队列)
pub async fn check_in(
    State(state): State<ServerState>,
    Json(req): Json<CheckInRequest>,
) -> AppResult<Json<AppResponse<CheckInOutcome>>> {
    if req.member_id.trim().is_empty() {
        return Err(AppError::validation("member_id is required"));
    }
    if req.branch_id.trim().is_empty() {
        return Err(AppError::validation("branch_id is required"));
    }

    let outcome = state.checkin.check_in(req).await?;
    Ok(ok(outcome))
}

/// POST /api/checkin/sync - 立即同步离线队列
pub async fn sync_pending(State(state): State<ServerState>) -> AppResult<Json<AppResponse<SyncReport>>> {
    let report = state.reconciler.sync_pending().await;
    Ok(ok(report))
}
