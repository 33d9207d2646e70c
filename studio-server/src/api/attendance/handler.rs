//! Attendance API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use shared::models::Member;

use crate::core::ServerState;
use crate::utils::{AppError, AppResponse, AppResult, ok};

#[derive(Debug, Serialize)]
pub struct DeleteAttendanceResponse {
    pub record_id: String,
    /// 有效记录删除后退还一次
    pub refunded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member: Option<Member>,
}

/// DELETE /api/attendance/{id} - 删除出勤记录 (有效记录退还次数)
pub async fn delete(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<AppResponse<DeleteAttendanceResponse>>> {
    let engine = state.engine.clone();
    let record_id = id.clone();
    let member = tokio::task::spawn_blocking(move || engine.delete_record(&record_id))
        .await
        .map_err(|e| AppError::internal(e.to_string()))??;

    Ok(ok(DeleteAttendanceResponse {
        record_id: id,
        refunded: member.is_some(),
        member,
    }))
}
