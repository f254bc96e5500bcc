//! Mode Controller
//!
//! Switches between standard polling and the opt-in workaround mode, tells
//! the scheduler about the resulting tick interval, and performs identity
//! rotation on the coordinator's behalf.

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use telematics_client::{AccountContext, TelematicsClient, TelematicsError};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::CoordinatorConfig;
use crate::session::Session;

/// Operating mode of the coordinator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Respect rate-limit backoff strictly
    #[default]
    Standard,
    /// Rotate the client identity on rate limit and retry once
    Workaround,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Standard => "standard",
            Mode::Workaround => "workaround",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current mode and the tick interval that goes with it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeState {
    pub mode: Mode,
    pub interval: Duration,
}

pub struct ModeController<C> {
    state: watch::Sender<ModeState>,
    standard_interval: Duration,
    workaround_interval: Duration,
    session: Arc<Session<C>>,
}

impl<C: TelematicsClient> ModeController<C> {
    pub(crate) fn new(config: &CoordinatorConfig, session: Arc<Session<C>>) -> Self {
        let mode = config.initial_mode();
        let (state, _) = watch::channel(ModeState {
            mode,
            interval: config.interval(mode),
        });
        if mode == Mode::Workaround {
            warn!("Workaround mode enabled: identity will be rotated on rate limit");
        }
        Self {
            state,
            standard_interval: config.interval(Mode::Standard),
            workaround_interval: config.interval(Mode::Workaround),
            session,
        }
    }

    pub fn mode(&self) -> Mode {
        self.state.borrow().mode
    }

    pub fn interval(&self) -> Duration {
        self.state.borrow().interval
    }

    pub fn state(&self) -> ModeState {
        *self.state.borrow()
    }

    /// Receive every mode change; the scheduler re-arms its timer on each
    pub fn subscribe(&self) -> watch::Receiver<ModeState> {
        self.state.subscribe()
    }

    /// Switch mode and return the tick interval now in effect. A tick that
    /// is already running keeps the mode it started with.
    pub fn set_mode(&self, mode: Mode) -> Duration {
        let interval = match mode {
            Mode::Standard => self.standard_interval,
            Mode::Workaround => self.workaround_interval,
        };
        let changed = self.state.send_if_modified(|state| {
            if state.mode == mode {
                return false;
            }
            *state = ModeState { mode, interval };
            true
        });
        if changed {
            info!(%mode, interval_secs = interval.as_secs(), "Mode changed");
        }
        interval
    }

    /// Close the upstream session, open a new one under a fresh identity and
    /// re-validate the account context
    pub async fn rotate_identity(&self) -> Result<AccountContext, TelematicsError> {
        info!("Rotating client identity");
        let result = match self.session.rotate_identity().await {
            Ok(()) => self.session.account_context().await,
            Err(e) => Err(e),
        };
        match &result {
            Ok(_) => {
                counter!("telematics_identity_rotations_total", "outcome" => "success").increment(1);
                info!("Identity rotation complete");
            }
            Err(e) => {
                counter!("telematics_identity_rotations_total", "outcome" => "failure").increment(1);
                warn!(error = %e, "Identity rotation abandoned");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telematics_client::{Outcome, SimulatedClient};

    fn controller(sim: &SimulatedClient) -> ModeController<SimulatedClient> {
        let config = CoordinatorConfig::default();
        let session = Arc::new(Session::new(sim.clone(), config.call_timeout()));
        ModeController::new(&config, session)
    }

    #[tokio::test]
    async fn test_set_mode_returns_interval() {
        let sim = SimulatedClient::new("VIN1");
        let modes = controller(&sim);
        let mut rx = modes.subscribe();

        assert_eq!(modes.mode(), Mode::Standard);
        assert_eq!(modes.set_mode(Mode::Workaround), Duration::from_secs(120));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().mode, Mode::Workaround);

        // Setting the same mode again is not a change
        assert_eq!(modes.set_mode(Mode::Workaround), Duration::from_secs(120));
        assert!(!rx.has_changed().unwrap());

        assert_eq!(modes.set_mode(Mode::Standard), Duration::from_secs(1800));
        assert_eq!(modes.interval(), Duration::from_secs(1800));
    }

    #[tokio::test]
    async fn test_rotation_changes_identity() {
        let sim = SimulatedClient::new("VIN1");
        let modes = controller(&sim);
        let before = sim.identity();

        modes.rotate_identity().await.unwrap();
        assert_ne!(sim.identity(), before);
        assert_eq!(sim.calls().rotations, 1);
        assert_eq!(sim.calls().account, 1);
    }

    #[tokio::test]
    async fn test_rotation_failure_reported() {
        let sim = SimulatedClient::new("VIN1");
        sim.script_rotation(Outcome::TransportFailure);
        let modes = controller(&sim);

        let result = modes.rotate_identity().await;
        assert!(matches!(result, Err(TelematicsError::Transport(_))));
        // No account check after a failed rotation
        assert_eq!(sim.calls().account, 0);
    }

    #[test]
    fn test_mode_serde() {
        assert_eq!(serde_json::to_string(&Mode::Workaround).unwrap(), "\"workaround\"");
        let mode: Mode = serde_json::from_str("\"standard\"").unwrap();
        assert_eq!(mode, Mode::Standard);
    }
}
