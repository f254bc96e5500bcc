//! Upstream Client Trait

use async_trait::async_trait;

use crate::error::TelematicsError;
use crate::payload::{AccountContext, CommandResult, DiagnosticsPayload, LocationPayload, VehicleCommand};

/// Operations the coordinator and command issuers need from the upstream API.
///
/// Reads and commands take `&self` so they can run side by side; replacing
/// the identity and closing the session take `&mut self`, which lets the
/// owner make those exclusive.
#[async_trait]
pub trait TelematicsClient: Send + Sync + 'static {
    /// Validate (or establish) the account context for the configured vehicle
    async fn get_account_context(&self) -> Result<AccountContext, TelematicsError>;

    /// Request the current vehicle location
    async fn fetch_location(&self) -> Result<LocationPayload, TelematicsError>;

    /// Request the given diagnostic items
    async fn fetch_diagnostics(&self, items: &[String]) -> Result<DiagnosticsPayload, TelematicsError>;

    /// Issue a one-shot remote command. Not idempotent.
    async fn issue_command(&self, command: VehicleCommand) -> Result<CommandResult, TelematicsError>;

    /// Close the current session and open a new one under a fresh identity
    async fn rotate_identity(&mut self) -> Result<(), TelematicsError>;

    /// Release held connection resources
    async fn close(&mut self);
}
