//! Capability-tagged actuators

use refresh_coordinator::CommandIssuer;
use serde::Serialize;
use std::fmt;
use telematics_client::{TelematicsClient, VehicleCommand};
use tokio::sync::watch;
use tracing::info;

use crate::error::ActuatorError;

/// What an actuator is allowed to do to the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// `lock_door` / `unlock_door`
    DoorLock,
    /// `start` / `cancel_start`
    RemoteStart,
}

impl Capability {
    pub const ALL: [Capability; 2] = [Capability::DoorLock, Capability::RemoteStart];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::DoorLock => "door_lock",
            Capability::RemoteStart => "remote_start",
        }
    }

    /// Command that moves the actuator to `Engaged`
    pub fn engage_command(&self) -> VehicleCommand {
        match self {
            Capability::DoorLock => VehicleCommand::LockDoor,
            Capability::RemoteStart => VehicleCommand::Start,
        }
    }

    /// Command that moves the actuator to `Released`
    pub fn release_command(&self) -> VehicleCommand {
        match self {
            Capability::DoorLock => VehicleCommand::UnlockDoor,
            Capability::RemoteStart => VehicleCommand::CancelStart,
        }
    }

    pub fn supports(&self, command: VehicleCommand) -> bool {
        command == self.engage_command() || command == self.release_command()
    }

    /// The capability a command belongs to
    pub fn for_command(command: VehicleCommand) -> Capability {
        match command {
            VehicleCommand::LockDoor | VehicleCommand::UnlockDoor => Capability::DoorLock,
            VehicleCommand::Start | VehicleCommand::CancelStart => Capability::RemoteStart,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last state confirmed by a successful command (locked / engine running)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorState {
    Unknown,
    Engaged,
    Released,
}

pub struct Actuator<C> {
    capability: Capability,
    issuer: CommandIssuer<C>,
    state: watch::Sender<ActuatorState>,
}

impl<C: TelematicsClient> Actuator<C> {
    pub fn new(capability: Capability, issuer: CommandIssuer<C>) -> Self {
        // Lock state is unknown until a command succeeds; the engine is
        // assumed off
        let initial = match capability {
            Capability::DoorLock => ActuatorState::Unknown,
            Capability::RemoteStart => ActuatorState::Released,
        };
        let (state, _) = watch::channel(initial);
        Self {
            capability,
            issuer,
            state,
        }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn state(&self) -> ActuatorState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ActuatorState> {
        self.state.subscribe()
    }

    pub async fn engage(&self) -> Result<ActuatorState, ActuatorError> {
        self.issue(self.capability.engage_command()).await
    }

    pub async fn release(&self) -> Result<ActuatorState, ActuatorError> {
        self.issue(self.capability.release_command()).await
    }

    /// Issue a command within this actuator's capability. The state only
    /// changes when the vehicle reports success.
    pub async fn issue(&self, command: VehicleCommand) -> Result<ActuatorState, ActuatorError> {
        if !self.capability.supports(command) {
            return Err(ActuatorError::Unsupported {
                capability: self.capability,
                command,
            });
        }

        self.issuer.issue(command).await?;

        let next = if command == self.capability.engage_command() {
            ActuatorState::Engaged
        } else {
            ActuatorState::Released
        };
        self.state.send_replace(next);
        info!(capability = %self.capability, state = ?next, "Actuator state updated");
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refresh_coordinator::{CommandError, CoordinatorConfig, RefreshCoordinator};
    use telematics_client::{Outcome, SimulatedClient};

    fn actuator(sim: &SimulatedClient, capability: Capability) -> Actuator<SimulatedClient> {
        let coordinator = RefreshCoordinator::new(CoordinatorConfig::default(), sim.clone()).unwrap();
        Actuator::new(capability, coordinator.commands())
    }

    #[tokio::test]
    async fn test_lock_state_follows_success() {
        let sim = SimulatedClient::new("VIN1");
        let lock = actuator(&sim, Capability::DoorLock);
        assert_eq!(lock.state(), ActuatorState::Unknown);

        assert_eq!(lock.engage().await.unwrap(), ActuatorState::Engaged);
        assert_eq!(lock.release().await.unwrap(), ActuatorState::Released);
        assert_eq!(sim.issued_commands().len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_command_keeps_state() {
        let sim = SimulatedClient::new("VIN1");
        let start = actuator(&sim, Capability::RemoteStart);
        sim.script_command(Outcome::Reject);

        let result = start.engage().await;
        assert!(matches!(result, Err(ActuatorError::Command(CommandError::Rejected { .. }))));
        assert_eq!(start.state(), ActuatorState::Released);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_state() {
        let sim = SimulatedClient::new("VIN1");
        let lock = actuator(&sim, Capability::DoorLock);
        lock.engage().await.unwrap();
        sim.script_command(Outcome::TransportFailure);

        assert!(lock.release().await.is_err());
        assert_eq!(lock.state(), ActuatorState::Engaged);
    }

    #[tokio::test]
    async fn test_capability_enforced() {
        let sim = SimulatedClient::new("VIN1");
        let lock = actuator(&sim, Capability::DoorLock);

        let result = lock.issue(VehicleCommand::Start).await;
        assert!(matches!(
            result,
            Err(ActuatorError::Unsupported { capability: Capability::DoorLock, command: VehicleCommand::Start })
        ));
        assert_eq!(sim.calls().commands, 0);
    }

    #[test]
    fn test_command_mapping() {
        for capability in Capability::ALL {
            assert_eq!(Capability::for_command(capability.engage_command()), capability);
            assert_eq!(Capability::for_command(capability.release_command()), capability);
        }
        assert!(!Capability::RemoteStart.supports(VehicleCommand::UnlockDoor));
    }
}
