//! Sync-up status and trigger handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use crate::sync::CycleReport;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

/// Sync-up status response
#[derive(Debug, Serialize)]
pub struct SyncStatusResponse {
    pub scheduler_running: bool,
    /// False while a refresh holds the gate
    pub gate_open: bool,
    pub master_key_fingerprint: Option<String>,
    pub last_cycle: Option<CycleReport>,
}

/// Current sync-up state and the last cycle report
pub async fn sync_status(State(state): State<AppState>) -> Json<SyncStatusResponse> {
    Json(SyncStatusResponse {
        scheduler_running: state.scheduler.is_running().await,
        gate_open: state.cron.gate().is_open(),
        master_key_fingerprint: state.cron.master_key_fingerprint(),
        last_cycle: state.cron.last_report().await,
    })
}

/// Report of the most recent cycle
pub async fn last_cycle(State(state): State<AppState>) -> ApiResult<Json<CycleReport>> {
    state
        .cron
        .last_report()
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no sync-up cycle has run yet".to_string()))
}

/// Trigger response
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub accepted: bool,
}

/// Ask the scheduler for an immediate cycle
pub async fn trigger_sync(State(state): State<AppState>) -> (StatusCode, Json<TriggerResponse>) {
    let accepted = state.scheduler.trigger();
    if !accepted {
        tracing::warn!("Sync-up trigger dropped, one is already pending");
    }
    let status = if accepted {
        StatusCode::ACCEPTED
    } else {
        StatusCode::TOO_MANY_REQUESTS
    };
    (status, Json(TriggerResponse { accepted }))
}
