//! Simulated Telematics Client
//!
//! Generates plausible upstream responses without network access. Tests
//! queue per-operation [`Outcome`]s to drive specific paths; when a queue is
//! empty the client responds normally, subject to an optional per-identity
//! call quota that mimics the upstream rate limiter.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

use crate::client::TelematicsClient;
use crate::error::TelematicsError;
use crate::identity::ClientIdentity;
use crate::items;
use crate::payload::{AccountContext, CommandResult, DiagnosticsPayload, LocationPayload, VehicleCommand};

/// Scripted result for the next call of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Respond with generated data
    Respond,
    /// Respond with a well-formed but unsuccessful command status
    Reject,
    RateLimit,
    TransportFailure,
    /// Respond with a body that does not match the expected shape
    Malformed,
    /// Never respond
    Hang,
}

/// Number of calls observed per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub account: usize,
    pub location: usize,
    pub diagnostics: usize,
    pub commands: usize,
    pub rotations: usize,
    pub closes: usize,
}

#[derive(Debug)]
struct SimState {
    identity: ClientIdentity,
    open: bool,
    quota_used: usize,
    calls: CallCounts,
    account: VecDeque<Outcome>,
    location: VecDeque<Outcome>,
    diagnostics: VecDeque<Outcome>,
    commands: VecDeque<Outcome>,
    rotations: VecDeque<Outcome>,
    issued: Vec<(VehicleCommand, ClientIdentity)>,
}

/// Offline stand-in for the vendor client.
///
/// Clones share state, so a test can keep a handle while the coordinator
/// owns another.
#[derive(Debug, Clone)]
pub struct SimulatedClient {
    vin: String,
    /// Read calls allowed per identity before rate limiting kicks in
    quota_per_identity: Option<usize>,
    /// Artificial latency for location and diagnostics requests
    read_delay: Duration,
    /// Artificial latency for remote commands
    command_delay: Duration,
    /// Artificial latency for identity rotation
    rotation_delay: Duration,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedClient {
    /// Create a simulated client for one vehicle
    pub fn new(vin: &str) -> Self {
        info!("Creating simulated telematics client for VIN {}", vin);
        Self {
            vin: vin.to_string(),
            quota_per_identity: None,
            read_delay: Duration::ZERO,
            command_delay: Duration::ZERO,
            rotation_delay: Duration::ZERO,
            state: Arc::new(Mutex::new(SimState {
                identity: ClientIdentity::generate(),
                open: true,
                quota_used: 0,
                calls: CallCounts::default(),
                account: VecDeque::new(),
                location: VecDeque::new(),
                diagnostics: VecDeque::new(),
                commands: VecDeque::new(),
                rotations: VecDeque::new(),
                issued: Vec::new(),
            })),
        }
    }

    /// Rate-limit location and diagnostics calls after `calls` per identity
    pub fn with_quota(mut self, calls: usize) -> Self {
        self.quota_per_identity = Some(calls);
        self
    }

    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    pub fn with_command_delay(mut self, delay: Duration) -> Self {
        self.command_delay = delay;
        self
    }

    pub fn with_rotation_delay(mut self, delay: Duration) -> Self {
        self.rotation_delay = delay;
        self
    }

    pub fn script_account(&self, outcome: Outcome) {
        self.lock().account.push_back(outcome);
    }

    pub fn script_location(&self, outcome: Outcome) {
        self.lock().location.push_back(outcome);
    }

    pub fn script_diagnostics(&self, outcome: Outcome) {
        self.lock().diagnostics.push_back(outcome);
    }

    pub fn script_command(&self, outcome: Outcome) {
        self.lock().commands.push_back(outcome);
    }

    pub fn script_rotation(&self, outcome: Outcome) {
        self.lock().rotations.push_back(outcome);
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    pub fn identity(&self) -> ClientIdentity {
        self.lock().identity
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Commands that reached the upstream, with the identity they ran under
    pub fn issued_commands(&self) -> Vec<(VehicleCommand, ClientIdentity)> {
        self.lock().issued.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A panicking test thread must not hide the counters from the others
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pop the scripted outcome for a read call, applying the quota when
    /// nothing is scripted
    fn next_read(&self, pick: fn(&mut SimState) -> &mut VecDeque<Outcome>) -> Outcome {
        let mut state = self.lock();
        if let Some(outcome) = pick(&mut *state).pop_front() {
            return outcome;
        }
        match self.quota_per_identity {
            Some(limit) if state.quota_used >= limit => Outcome::RateLimit,
            Some(_) => {
                state.quota_used += 1;
                Outcome::Respond
            }
            None => Outcome::Respond,
        }
    }

    fn ensure_open(&self) -> Result<(), TelematicsError> {
        if self.lock().open {
            Ok(())
        } else {
            Err(TelematicsError::SessionClosed)
        }
    }

    async fn read_latency(&self) {
        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }
    }

    async fn settle(outcome: Outcome, context: &str) -> Result<(), TelematicsError> {
        match outcome {
            Outcome::Respond | Outcome::Reject | Outcome::Malformed => Ok(()),
            Outcome::RateLimit => Err(TelematicsError::RateLimited),
            Outcome::TransportFailure => Err(TelematicsError::Transport(format!(
                "simulated connection reset during {}",
                context
            ))),
            Outcome::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    fn location_response(&self) -> Value {
        let offset = (self.lock().calls.location % 10) as f64 * 0.0001;
        json!({
            "commandResponse": {
                "status": "success",
                "body": {
                    "location": {
                        "latitude": format!("{:.6}", 42.331427 + offset),
                        "longitude": format!("{:.6}", -83.045754 - offset),
                    }
                }
            }
        })
    }

    fn diagnostics_response(requested: &[String]) -> Value {
        let entries: Vec<Value> = requested
            .iter()
            .filter_map(|name| Self::diagnostic_entry(name))
            .collect();
        json!({
            "commandResponse": {
                "status": "success",
                "body": { "diagnosticResponse": entries }
            }
        })
    }

    fn diagnostic_entry(name: &str) -> Option<Value> {
        let single = |value: &str, unit: &str| {
            json!({ "name": name, "diagnosticElement": [ { "name": name, "value": value, "unit": unit } ] })
        };
        let entry = match name {
            items::ODOMETER => single("15288.2", "KM"),
            items::EV_BATTERY_LEVEL => single("78.5", "%"),
            items::EV_CHARGE_STATE => single("not_charging", ""),
            items::EV_PLUG_STATE => single("unplugged", ""),
            items::EV_PLUG_VOLTAGE => single("0", "V"),
            items::CHARGER_POWER_LEVEL => single("NO_REDUCTION", ""),
            items::LAST_TRIP_ELECTRIC_ECON => single("6.1", "KMPLE"),
            items::CHARGE_COMPLETE_TIME => json!({
                "name": name,
                "diagnosticElement": [
                    { "name": "HV BATTERY CHARGE COMPLETE DAY", "value": "Tuesday" },
                    { "name": "HV BATTERY CHARGE COMPLETE HOUR", "value": "6" },
                    { "name": "HV BATTERY CHARGE COMPLETE MINUTE", "value": "30" }
                ]
            }),
            items::ENERGY_EFFICIENCY => json!({
                "name": name,
                "diagnosticElement": [
                    { "name": "LIFETIME EFFICIENCY", "value": "17.4", "unit": "KWH/100KM" }
                ]
            }),
            items::VEHICLE_RANGE => json!({
                "name": name,
                "diagnosticElement": [ { "name": "EV RANGE", "value": "301", "unit": "KM" } ]
            }),
            items::TIRE_PRESSURE => json!({
                "name": name,
                "diagnosticElement": [
                    { "name": "TIRE PRESSURE LF", "value": "262", "unit": "KPa", "message": "GREEN" },
                    { "name": "TIRE PRESSURE RF", "value": "259", "unit": "KPa", "message": "GREEN" },
                    { "name": "TIRE PRESSURE LR", "value": "241", "unit": "KPa", "message": "YELLOW" },
                    { "name": "TIRE PRESSURE RR", "value": "258", "unit": "KPa", "message": "GREEN" }
                ]
            }),
            _ => return None,
        };
        Some(entry)
    }
}

#[async_trait]
impl TelematicsClient for SimulatedClient {
    async fn get_account_context(&self) -> Result<AccountContext, TelematicsError> {
        self.ensure_open()?;
        let outcome = {
            let mut state = self.lock();
            state.calls.account += 1;
            state.account.pop_front().unwrap_or(Outcome::Respond)
        };
        Self::settle(outcome, "account lookup").await?;

        let response = if outcome == Outcome::Malformed {
            json!({ "vehicles": "unavailable" })
        } else {
            json!({
                "vehicles": { "vehicle": [
                    { "vin": self.vin, "year": "2022", "make": "Chevrolet", "model": "Bolt EUV" }
                ]}
            })
        };
        AccountContext::from_response(&response)
    }

    async fn fetch_location(&self) -> Result<LocationPayload, TelematicsError> {
        self.ensure_open()?;
        self.lock().calls.location += 1;
        let outcome = self.next_read(|s| &mut s.location);
        self.read_latency().await;
        Self::settle(outcome, "location request").await?;

        let response = if outcome == Outcome::Malformed {
            json!({ "commandResponse": { "body": { "position": [] } } })
        } else {
            self.location_response()
        };
        debug!("Simulated location response: {}", response);
        LocationPayload::from_response(&response)
    }

    async fn fetch_diagnostics(&self, items: &[String]) -> Result<DiagnosticsPayload, TelematicsError> {
        self.ensure_open()?;
        self.lock().calls.diagnostics += 1;
        let outcome = self.next_read(|s| &mut s.diagnostics);
        self.read_latency().await;
        Self::settle(outcome, "diagnostics request").await?;

        let response = if outcome == Outcome::Malformed {
            json!({ "commandResponse": { "body": { "diagnosticResponse": "pending" } } })
        } else {
            Self::diagnostics_response(items)
        };
        DiagnosticsPayload::from_response(&response)
    }

    async fn issue_command(&self, command: VehicleCommand) -> Result<CommandResult, TelematicsError> {
        self.ensure_open()?;
        let (outcome, identity) = {
            let mut state = self.lock();
            state.calls.commands += 1;
            (state.commands.pop_front().unwrap_or(Outcome::Respond), state.identity)
        };
        if !self.command_delay.is_zero() {
            tokio::time::sleep(self.command_delay).await;
        }
        Self::settle(outcome, command.as_str()).await?;
        self.lock().issued.push((command, identity));

        let response = match outcome {
            Outcome::Malformed => json!({ "commandResponse": {} }),
            Outcome::Reject => json!({ "commandResponse": { "status": "failure" } }),
            _ => json!({ "commandResponse": { "status": "success" } }),
        };
        CommandResult::from_response(command, &response)
    }

    async fn rotate_identity(&mut self) -> Result<(), TelematicsError> {
        let outcome = {
            let mut state = self.lock();
            state.calls.rotations += 1;
            // The old session is gone whether or not a new one comes up
            state.open = false;
            state.rotations.pop_front().unwrap_or(Outcome::Respond)
        };
        if !self.rotation_delay.is_zero() {
            tokio::time::sleep(self.rotation_delay).await;
        }
        Self::settle(outcome, "session rotation").await?;

        let mut state = self.lock();
        state.identity = ClientIdentity::generate();
        state.quota_used = 0;
        state.open = true;
        info!("Simulated client rotated identity to {}", state.identity);
        Ok(())
    }

    async fn close(&mut self) {
        let mut state = self.lock();
        state.calls.closes += 1;
        state.open = false;
        debug!("Simulated client closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_items() -> Vec<String> {
        vec![items::ODOMETER.to_string(), items::TIRE_PRESSURE.to_string()]
    }

    #[tokio::test]
    async fn test_default_responses_decode() {
        let client = SimulatedClient::new("VIN123");
        let account = client.get_account_context().await.unwrap();
        assert!(account.has_vehicle("VIN123"));

        let location = client.fetch_location().await.unwrap();
        assert!(location.latitude > 42.0);

        let diagnostics = client.fetch_diagnostics(&all_items()).await.unwrap();
        assert_eq!(diagnostics.entries.len(), 2);
        assert_eq!(diagnostics.value(items::ODOMETER), Some("15288.2"));
    }

    #[tokio::test]
    async fn test_scripted_outcomes_apply_in_order() {
        let client = SimulatedClient::new("VIN123");
        client.script_location(Outcome::RateLimit);
        client.script_location(Outcome::Malformed);

        assert_eq!(client.fetch_location().await, Err(TelematicsError::RateLimited));
        assert!(matches!(
            client.fetch_location().await,
            Err(TelematicsError::Protocol { .. })
        ));
        assert!(client.fetch_location().await.is_ok());
        assert_eq!(client.calls().location, 3);
    }

    #[tokio::test]
    async fn test_quota_resets_on_rotation() {
        let mut client = SimulatedClient::new("VIN123").with_quota(1);
        let before = client.identity();

        assert!(client.fetch_location().await.is_ok());
        assert_eq!(client.fetch_location().await, Err(TelematicsError::RateLimited));

        client.rotate_identity().await.unwrap();
        assert_ne!(client.identity(), before);
        assert!(client.fetch_location().await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_rotation_leaves_session_closed() {
        let mut client = SimulatedClient::new("VIN123");
        client.script_rotation(Outcome::TransportFailure);

        assert!(client.rotate_identity().await.is_err());
        assert!(!client.is_open());
        assert_eq!(client.fetch_location().await, Err(TelematicsError::SessionClosed));
    }

    #[tokio::test]
    async fn test_command_records_identity() {
        let client = SimulatedClient::new("VIN123");
        let result = client.issue_command(VehicleCommand::LockDoor).await.unwrap();
        assert!(result.is_success());

        let issued = client.issued_commands();
        assert_eq!(issued, vec![(VehicleCommand::LockDoor, client.identity())]);
    }

    #[tokio::test]
    async fn test_close_counts() {
        let mut client = SimulatedClient::new("VIN123");
        client.close().await;
        assert_eq!(client.calls().closes, 1);
        assert!(!client.is_open());
    }
}
