//! Remote command routes

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use telematics_client::{TelematicsClient, VehicleCommand};
use vehicle_readers::{ActuatorState, Capability};

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub command: VehicleCommand,
    pub capability: Capability,
    pub state: ActuatorState,
}

/// `POST /api/v1/vehicle/commands/:command` with `lock`, `unlock`, `start`
/// or `cancel_start` (the upstream command names work too)
pub async fn post_command<C: TelematicsClient>(
    State(state): State<Arc<AppState<C>>>,
    Path(name): Path<String>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command: VehicleCommand = name.parse().map_err(ApiError::BadRequest)?;
    let capability = Capability::for_command(command);
    let actuator = state.actuator(capability);

    let new_state = actuator.issue(command).await?;
    Ok(Json(CommandResponse {
        command,
        capability,
        state: new_state,
    }))
}
