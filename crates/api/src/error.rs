//! HTTP error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use refresh_coordinator::CommandError;
use serde_json::json;
use telematics_client::TelematicsError;
use thiserror::Error;
use vehicle_readers::ActuatorError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} not available yet")]
    NotAvailable(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Actuator(#[from] ActuatorError),

    #[error("metrics recorder not installed")]
    MetricsDisabled,

    #[error("{0}")]
    Forbidden(&'static str),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotAvailable(_) | ApiError::MetricsDisabled => StatusCode::NOT_FOUND,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) | ApiError::Actuator(ActuatorError::Unsupported { .. }) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Actuator(ActuatorError::Command(CommandError::Upstream { source, .. })) => match source {
                TelematicsError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                TelematicsError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            },
            ApiError::Actuator(ActuatorError::Command(CommandError::Rejected { .. })) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telematics_client::VehicleCommand;

    #[test]
    fn test_status_mapping() {
        let timeout = ApiError::Actuator(ActuatorError::Command(CommandError::Upstream {
            command: VehicleCommand::Start,
            source: TelematicsError::Timeout(60_000),
        }));
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);

        let rejected = ApiError::Actuator(ActuatorError::Command(CommandError::Rejected {
            command: VehicleCommand::LockDoor,
        }));
        assert_eq!(rejected.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ApiError::NotAvailable("location").status(), StatusCode::NOT_FOUND);
    }
}
