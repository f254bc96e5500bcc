//! Mode switch route

use axum::{extract::State, Json};
use refresh_coordinator::Mode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use telematics_client::TelematicsClient;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: Mode,
}

#[derive(Debug, Serialize)]
pub struct ModeResponse {
    pub mode: Mode,
    pub interval_secs: u64,
}

/// Switch operating mode; takes effect from the next tick. Refused unless
/// `allow_runtime_mode_switch` is set.
pub async fn put_mode<C: TelematicsClient>(
    State(state): State<Arc<AppState<C>>>,
    Json(request): Json<ModeRequest>,
) -> Result<Json<ModeResponse>, ApiError> {
    if !state.allow_mode_switch {
        warn!(mode = %request.mode, "Runtime mode switch refused");
        return Err(ApiError::Forbidden("runtime mode switching is disabled"));
    }

    info!(mode = %request.mode, "Mode change requested over HTTP");
    let interval = state.coordinator.mode_controller().set_mode(request.mode);
    Ok(Json(ModeResponse {
        mode: request.mode,
        interval_secs: interval.as_secs(),
    }))
}
