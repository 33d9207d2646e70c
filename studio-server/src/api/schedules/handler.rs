//! Schedule API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use shared::ResolvedClass;
use shared::models::{ClassSchedule, ClassSlot};

use crate::core::ServerState;
use crate::utils::time::{parse_date, parse_time, venue_local};
use crate::utils::{AppError, AppResponse, AppResult, ok};

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    /// HH:MM, venue-local. Defaults to the current venue time.
    pub at: Option<String>,
    pub hint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CorrectionRequest {
    pub old_slots: Vec<ClassSlot>,
    pub new_slots: Vec<ClassSlot>,
}

#[derive(Debug, Serialize)]
pub struct CorrectionResponse {
    pub updated: usize,
}

/// GET /api/schedules/{branch_id}/{date} - 获取课表镜像
pub async fn get(
    State(state): State<ServerState>,
    Path((branch_id, date)): Path<(String, String)>,
) -> AppResult<Json<AppResponse<ClassSchedule>>> {
    let date = parse_date(&date)?;
    let slots = state.storage.get_schedule(&branch_id, date)?;
    Ok(ok(ClassSchedule { branch_id, date, slots }))
}

/// PUT /api/schedules/{branch_id}/{date} - 替换课表镜像
pub async fn replace(
    State(state): State<ServerState>,
    Path((branch_id, date)): Path<(String, String)>,
    Json(slots): Json<Vec<ClassSlot>>,
) -> AppResult<Json<AppResponse<ClassSchedule>>> {
    let date = parse_date(&date)?;
    if let Some(slot) = slots.iter().find(|s| s.duration == 0) {
        return Err(AppError::validation(format!("Slot '{}' has zero duration", slot.title)));
    }
    state.storage.put_schedule(&branch_id, date, &slots)?;
    tracing::info!(branch_id = %branch_id, date = %date, slots = slots.len(), "Schedule mirrored");
    Ok(ok(ClassSchedule { branch_id, date, slots }))
}

/// GET /api/schedules/{branch_id}/{date}/resolve?at=HH:MM&hint= - 解析签到归属课程
pub async fn resolve(
    State(state): State<ServerState>,
    Path((branch_id, date)): Path<(String, String)>,
    Query(query): Query<ResolveQuery>,
) -> AppResult<Json<AppResponse<ResolvedClass>>> {
    let date = parse_date(&date)?;
    let at = match query.at.as_deref() {
        Some(at) => parse_time(at)?,
        None => venue_local(chrono::Utc::now(), state.config.venue_tz).1,
    };
    let resolved = state
        .checkin
        .resolve(&branch_id, date, at, query.hint.as_deref())
        .await?;
    Ok(ok(resolved))
}

/// POST /api/schedules/{branch_id}/{date}/corrections - 追溯修正当天出勤记录
pub async fn correct(
    State(state): State<ServerState>,
    Path((branch_id, date)): Path<(String, String)>,
    Json(req): Json<CorrectionRequest>,
) -> AppResult<Json<AppResponse<CorrectionResponse>>> {
    let date = parse_date(&date)?;
    let engine = state.engine.clone();
    let updated = tokio::task::spawn_blocking(move || {
        engine.correct_schedule(&branch_id, date, &req.old_slots, &req.new_slots)
    })
    .await
    .map_err(|e| AppError::internal(e.to_string()))??;
    Ok(ok(CorrectionResponse { updated }))
}
