//! Shared upstream session
//!
//! Wraps the adapter in a read/write lock. Fetches and commands run under
//! shared access; identity rotation and close need exclusive access, so a
//! rotation waits for in-flight calls and blocks new ones until it is done.
//!
//! The client drops its old session before opening the new one, so a failed
//! rotation leaves no usable session. The session remembers that until a
//! later rotation succeeds.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use telematics_client::{
    AccountContext, CommandResult, DiagnosticsPayload, LocationPayload, TelematicsClient,
    TelematicsError, VehicleCommand,
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub struct Session<C> {
    client: RwLock<C>,
    call_timeout: Duration,
    /// Set when a rotation failed part way; cleared by the next successful one
    lost: AtomicBool,
}

impl<C: TelematicsClient> Session<C> {
    pub fn new(client: C, call_timeout: Duration) -> Self {
        Self {
            client: RwLock::new(client),
            call_timeout,
            lost: AtomicBool::new(false),
        }
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Whether the last rotation left the client without a session
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Apply the per-call timeout. An expired call is reported, not retried:
    /// the request may already have reached the upstream.
    async fn bounded<T, F>(&self, call: F) -> Result<T, TelematicsError>
    where
        F: Future<Output = Result<T, TelematicsError>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TelematicsError::Timeout(self.call_timeout.as_millis() as u64)),
        }
    }

    pub async fn account_context(&self) -> Result<AccountContext, TelematicsError> {
        let client = self.client.read().await;
        self.bounded(client.get_account_context()).await
    }

    pub async fn fetch_location(&self) -> Result<LocationPayload, TelematicsError> {
        let client = self.client.read().await;
        self.bounded(client.fetch_location()).await
    }

    pub async fn fetch_diagnostics(&self, items: &[String]) -> Result<DiagnosticsPayload, TelematicsError> {
        let client = self.client.read().await;
        self.bounded(client.fetch_diagnostics(items)).await
    }

    pub async fn issue_command(&self, command: VehicleCommand) -> Result<CommandResult, TelematicsError> {
        let client = self.client.read().await;
        self.bounded(client.issue_command(command)).await
    }

    /// Replace the upstream identity. Waits for every call holding shared
    /// access to finish first.
    pub async fn rotate_identity(&self) -> Result<(), TelematicsError> {
        let mut client = self.client.write().await;
        debug!("Session locked for identity rotation");
        let result = self.bounded(client.rotate_identity()).await;
        self.lost.store(result.is_err(), Ordering::Release);
        if result.is_err() {
            warn!("Rotation failed, upstream session must be re-established");
        }
        result
    }

    pub async fn close(&self) {
        let mut client = self.client.write().await;
        client.close().await;
        info!("Upstream session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telematics_client::{Outcome, SimulatedClient};

    #[tokio::test(start_paused = true)]
    async fn test_hung_call_times_out() {
        let sim = SimulatedClient::new("VIN1");
        sim.script_location(Outcome::Hang);
        let session = Session::new(sim.clone(), Duration::from_secs(60));

        let result = session.fetch_location().await;
        assert_eq!(result, Err(TelematicsError::Timeout(60_000)));
        assert_eq!(sim.calls().location, 1);
    }

    #[tokio::test]
    async fn test_failed_rotation_marks_session_lost() {
        let sim = SimulatedClient::new("VIN1");
        sim.script_rotation(Outcome::TransportFailure);
        let session = Session::new(sim.clone(), Duration::from_secs(5));
        assert!(!session.is_lost());

        assert!(session.rotate_identity().await.is_err());
        assert!(session.is_lost());
        assert_eq!(session.fetch_location().await, Err(TelematicsError::SessionClosed));

        session.rotate_identity().await.unwrap();
        assert!(!session.is_lost());
        assert!(session.fetch_location().await.is_ok());
    }

    #[tokio::test]
    async fn test_close_releases_client() {
        let sim = SimulatedClient::new("VIN1");
        let session = Session::new(sim.clone(), Duration::from_secs(5));
        session.close().await;

        assert!(!sim.is_open());
        assert_eq!(session.fetch_location().await, Err(TelematicsError::SessionClosed));
    }
}
