//! Actuator Error Types

use refresh_coordinator::CommandError;
use telematics_client::VehicleCommand;
use thiserror::Error;

use crate::actuator::Capability;

#[derive(Debug, Clone, Error)]
pub enum ActuatorError {
    #[error("{capability} actuator cannot issue {command}")]
    Unsupported {
        capability: Capability,
        command: VehicleCommand,
    },

    #[error(transparent)]
    Command(#[from] CommandError),
}
