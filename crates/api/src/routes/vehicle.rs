//! Snapshot read routes

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use refresh_coordinator::{Snapshot, TickOutcome, TickReport};
use serde::Serialize;
use std::sync::Arc;
use telematics_client::TelematicsClient;
use vehicle_readers::{is_electric_vehicle, read_all, ActuatorState, Capability, LocationReading, LocationTracker, SensorReading};

use crate::error::ApiError;
use crate::AppState;

pub async fn get_snapshot<C: TelematicsClient>(State(state): State<Arc<AppState<C>>>) -> Json<Snapshot> {
    Json(state.coordinator.snapshot().as_ref().clone())
}

pub async fn get_location<C: TelematicsClient>(
    State(state): State<Arc<AppState<C>>>,
) -> Result<Json<LocationReading>, ApiError> {
    LocationTracker::read(&state.coordinator.snapshot())
        .map(Json)
        .ok_or(ApiError::NotAvailable("location"))
}

#[derive(Debug, Serialize)]
pub struct SensorsResponse {
    pub revision: u64,
    pub electric: bool,
    pub readings: Vec<SensorReading>,
}

pub async fn get_sensors<C: TelematicsClient>(State(state): State<Arc<AppState<C>>>) -> Json<SensorsResponse> {
    let snapshot = state.coordinator.snapshot();
    Json(SensorsResponse {
        revision: snapshot.revision,
        electric: snapshot.diagnostics.as_ref().map_or(false, is_electric_vehicle),
        readings: read_all(&snapshot, Utc::now()),
    })
}

#[derive(Debug, Serialize)]
pub struct ActuatorStatus {
    pub capability: Capability,
    pub state: ActuatorState,
}

pub async fn get_actuators<C: TelematicsClient>(State(state): State<Arc<AppState<C>>>) -> Json<Vec<ActuatorStatus>> {
    let statuses = [&state.door_lock, &state.remote_start]
        .into_iter()
        .map(|actuator| ActuatorStatus {
            capability: actuator.capability(),
            state: actuator.state(),
        })
        .collect();
    Json(statuses)
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<TickReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run a tick now instead of waiting for the scheduler
pub async fn post_refresh<C: TelematicsClient>(
    State(state): State<Arc<AppState<C>>>,
) -> (StatusCode, Json<RefreshResponse>) {
    let outcome = state.coordinator.tick().await;
    let status = match &outcome {
        TickOutcome::Refreshed { .. } => StatusCode::OK,
        TickOutcome::Skipped => StatusCode::CONFLICT,
        TickOutcome::Failed { .. } => StatusCode::BAD_GATEWAY,
    };
    let revision = match &outcome {
        TickOutcome::Refreshed { revision, .. } => Some(*revision),
        _ => None,
    };
    (
        status,
        Json(RefreshResponse {
            outcome: outcome.label(),
            revision,
            report: outcome.report().copied(),
            error: outcome.error().map(ToString::to_string),
        }),
    )
}
