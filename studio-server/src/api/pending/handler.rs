//! Pending Queue API Handlers

use axum::{Json, extract::State};
use serde::Serialize;
use shared::models::{DeadLetterEntry, PendingCheckIn};

use crate::core::ServerState;
use crate::utils::{AppResponse, AppResult, ok};

#[derive(Debug, Serialize)]
pub struct RequeueResponse {
    pub requeued: usize,
}

/// GET /api/pending - 两级队列中待同步的签到 (按发生时间排序)
pub async fn list(State(state): State<ServerState>) -> AppResult<Json<AppResponse<Vec<PendingCheckIn>>>> {
    let mut entries = state.offline.local().snapshot();
    entries.extend(state.storage.list_pending()?);
    entries.sort_by_key(|p| p.occurred_at);
    Ok(ok(entries))
}

/// GET /api/pending/dead-letters - 超过重试次数的签到
pub async fn list_dead_letters(
    State(state): State<ServerState>,
) -> AppResult<Json<AppResponse<Vec<DeadLetterEntry>>>> {
    Ok(ok(state.storage.list_dead_letters()?))
}

/// POST /api/pending/dead-letters/requeue - 死信重新入队并触发同步
pub async fn requeue_dead_letters(
    State(state): State<ServerState>,
) -> AppResult<Json<AppResponse<RequeueResponse>>> {
    let requeued = state.storage.requeue_dead_letters()?;
    if requeued > 0 {
        tracing::info!(target: "audit", requeued, "Dead letters requeued");
        state.sync_trigger.notify_one();
    }
    Ok(ok(RequeueResponse { requeued }))
}
