//! One-shot remote commands
//!
//! Commands share the upstream session with the refresh cycle but nothing
//! else: no cache, no backoff. They are issued once. A command that times
//! out, is rate limited, or fails in transport is reported to the caller and
//! never retried here, because the vehicle may already have acted on it.
//!
//! Identity rotation takes the session exclusively. A command already in
//! flight finishes under the old identity before the rotation starts; a
//! command issued while a rotation is running waits for it and then runs
//! once under the new identity, or fails with `SessionClosed` if the
//! rotation failed.

use metrics::counter;
use std::sync::Arc;
use telematics_client::{CommandResult, TelematicsClient, VehicleCommand};
use tracing::{info, warn};

use crate::error::CommandError;
use crate::session::Session;

pub struct CommandIssuer<C> {
    session: Arc<Session<C>>,
}

impl<C> Clone for CommandIssuer<C> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
        }
    }
}

impl<C: TelematicsClient> CommandIssuer<C> {
    pub(crate) fn new(session: Arc<Session<C>>) -> Self {
        Self { session }
    }

    /// Issue `command` and wait for the vehicle's answer
    pub async fn issue(&self, command: VehicleCommand) -> Result<CommandResult, CommandError> {
        info!(%command, "Issuing remote command");
        let outcome = match self.session.issue_command(command).await {
            Ok(result) if result.is_success() => Ok(result),
            Ok(_) => Err(CommandError::Rejected { command }),
            Err(source) => Err(CommandError::Upstream { command, source }),
        };

        let label = match &outcome {
            Ok(_) => "success",
            Err(CommandError::Rejected { .. }) => "rejected",
            Err(CommandError::Upstream { .. }) => "error",
        };
        counter!("telematics_commands_total", "command" => command.as_str(), "outcome" => label)
            .increment(1);
        if let Err(e) = &outcome {
            warn!(%command, error = %e, "Remote command did not succeed");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinatorConfig;
    use crate::mode::ModeController;
    use std::time::Duration;
    use telematics_client::{CommandStatus, Outcome, SimulatedClient, TelematicsError};

    struct Fixture {
        sim: SimulatedClient,
        commands: CommandIssuer<SimulatedClient>,
        modes: Arc<ModeController<SimulatedClient>>,
    }

    fn fixture(sim: SimulatedClient) -> Fixture {
        let config = CoordinatorConfig::default();
        let session = Arc::new(Session::new(sim.clone(), config.call_timeout()));
        Fixture {
            commands: CommandIssuer::new(session.clone()),
            modes: Arc::new(ModeController::new(&config, session)),
            sim,
        }
    }

    #[tokio::test]
    async fn test_successful_command() {
        let f = fixture(SimulatedClient::new("VIN1"));
        let result = f.commands.issue(VehicleCommand::LockDoor).await.unwrap();
        assert_eq!(result.status, CommandStatus::Success);
        assert_eq!(f.sim.issued_commands().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_command() {
        let sim = SimulatedClient::new("VIN1");
        sim.script_command(Outcome::Reject);
        let f = fixture(sim);

        let result = f.commands.issue(VehicleCommand::Start).await;
        assert!(matches!(result, Err(CommandError::Rejected { command: VehicleCommand::Start })));
    }

    #[tokio::test]
    async fn test_rate_limited_command_not_retried() {
        let sim = SimulatedClient::new("VIN1");
        sim.script_command(Outcome::RateLimit);
        let f = fixture(sim);

        let result = f.commands.issue(VehicleCommand::UnlockDoor).await;
        assert!(matches!(
            result,
            Err(CommandError::Upstream { source: TelematicsError::RateLimited, .. })
        ));
        assert_eq!(f.sim.calls().commands, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_command_not_retried() {
        let sim = SimulatedClient::new("VIN1");
        sim.script_command(Outcome::Hang);
        let f = fixture(sim);

        let result = f.commands.issue(VehicleCommand::Start).await;
        assert!(matches!(
            result,
            Err(CommandError::Upstream { source: TelematicsError::Timeout(60_000), .. })
        ));
        assert_eq!(f.sim.calls().commands, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_command_finishes_before_rotation() {
        let f = fixture(SimulatedClient::new("VIN1").with_command_delay(Duration::from_secs(5)));
        let old_identity = f.sim.identity();

        let commands = f.commands.clone();
        let command = tokio::spawn(async move { commands.issue(VehicleCommand::LockDoor).await });
        tokio::time::sleep(Duration::from_secs(1)).await;

        let modes = f.modes.clone();
        let rotation = tokio::spawn(async move { modes.rotate_identity().await });

        assert!(command.await.unwrap().is_ok());
        assert!(rotation.await.unwrap().is_ok());

        let issued = f.sim.issued_commands();
        assert_eq!(issued, vec![(VehicleCommand::LockDoor, old_identity)]);
        assert_ne!(f.sim.identity(), old_identity);
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_during_rotation_runs_once_on_new_identity() {
        let f = fixture(SimulatedClient::new("VIN1").with_rotation_delay(Duration::from_secs(5)));
        let old_identity = f.sim.identity();

        let modes = f.modes.clone();
        let rotation = tokio::spawn(async move { modes.rotate_identity().await });
        tokio::time::sleep(Duration::from_secs(1)).await;

        let result = f.commands.issue(VehicleCommand::Start).await;
        assert!(result.is_ok());
        assert!(rotation.await.unwrap().is_ok());

        let issued = f.sim.issued_commands();
        assert_eq!(issued.len(), 1);
        assert_eq!(issued[0].0, VehicleCommand::Start);
        assert_ne!(issued[0].1, old_identity);
        assert_eq!(issued[0].1, f.sim.identity());
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_during_failed_rotation_fails_cleanly() {
        let sim = SimulatedClient::new("VIN1").with_rotation_delay(Duration::from_secs(5));
        sim.script_rotation(Outcome::TransportFailure);
        let f = fixture(sim);

        let modes = f.modes.clone();
        let rotation = tokio::spawn(async move { modes.rotate_identity().await });
        tokio::time::sleep(Duration::from_secs(1)).await;

        let result = f.commands.issue(VehicleCommand::UnlockDoor).await;
        assert!(matches!(
            result,
            Err(CommandError::Upstream { source: TelematicsError::SessionClosed, .. })
        ));
        assert!(rotation.await.unwrap().is_err());

        // Nothing reached the vehicle, so nothing can have run twice
        assert!(f.sim.issued_commands().is_empty());
        assert_eq!(f.sim.calls().commands, 0);
    }
}
