//! Member API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use shared::models::Member;

use crate::core::ServerState;
use crate::utils::{AppError, AppResponse, AppResult, ok};

/// GET /api/members/{id} - 获取单个会员
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<AppResponse<Member>>> {
    let member = state
        .storage
        .get_member(&id)?
        .ok_or_else(|| AppError::not_found(format!("Member {} not found", id)))?;
    Ok(ok(member))
}

/// PUT /api/members/{id} - 同步会员文档
pub async fn upsert(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(member): Json<Member>,
) -> AppResult<Json<AppResponse<Member>>> {
    if member.id != id {
        return Err(AppError::validation(format!(
            "Member id mismatch: path {} vs body {}",
            id, member.id
        )));
    }
    if member.name.trim().is_empty() {
        return Err(AppError::validation("name is required"));
    }

    let stored = state.engine.upsert_member(&member)?;
    Ok(ok(stored))
}
