//! Health and metrics routes

use axum::{extract::State, http::header, response::IntoResponse, Json};
use refresh_coordinator::{Mode, TickRecord};
use serde::Serialize;
use std::sync::Arc;
use telematics_client::TelematicsClient;

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "starting" before the first tick, then "healthy" or "degraded"
    pub status: &'static str,
    pub version: String,
    pub uptime_seconds: u64,
    pub mode: Mode,
    pub interval_secs: u64,
    pub snapshot_revision: u64,
    pub last_tick: Option<TickRecord>,
}

pub async fn get_health<C: TelematicsClient>(State(state): State<Arc<AppState<C>>>) -> Json<HealthResponse> {
    let modes = state.coordinator.mode_controller().state();
    let last_tick = state.coordinator.last_tick();
    let status = match &last_tick {
        None => "starting",
        Some(record) if record.outcome == "failed" => "degraded",
        Some(_) => "healthy",
    };

    Json(HealthResponse {
        status,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        mode: modes.mode,
        interval_secs: modes.interval.as_secs(),
        snapshot_revision: state.coordinator.snapshot().revision,
        last_tick,
    })
}

/// Prometheus text exposition
pub async fn get_metrics<C: TelematicsClient>(
    State(state): State<Arc<AppState<C>>>,
) -> Result<impl IntoResponse, ApiError> {
    let handle = state.metrics.as_ref().ok_or(ApiError::MetricsDisabled)?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    ))
}
