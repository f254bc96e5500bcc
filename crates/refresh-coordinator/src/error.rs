//! Coordinator Error Types

use telematics_client::{TelematicsError, VehicleCommand};
use thiserror::Error;

use crate::DataClass;

/// Invalid coordinator configuration. Only raised while building a
/// coordinator, never during a tick.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("{name} must not exceed {max}s")]
    DurationTooLong { name: &'static str, max: u64 },

    #[error("workaround interval ({workaround}s) must be shorter than the base interval ({base}s)")]
    WorkaroundNotFaster { workaround: u64, base: u64 },

    #[error("diagnostic item list is empty")]
    NoDiagnosticItems,

    #[error("diagnostic item names must not be blank")]
    BlankDiagnosticItem,

    #[error("duplicate diagnostic item: {0}")]
    DuplicateDiagnosticItem(String),
}

/// Reportable failure of a refresh tick.
///
/// Rate limiting never shows up here; it is absorbed by backoff or identity
/// rotation inside the tick.
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    #[error("account context unavailable: {0}")]
    AccountContext(#[source] TelematicsError),

    #[error("{class} refresh failed: {source}")]
    Upstream {
        class: DataClass,
        #[source]
        source: TelematicsError,
    },

    #[error("identity rotation failed: {0}")]
    RotationFailed(#[source] TelematicsError),

    #[error("vehicle {0} is not registered to this account")]
    VehicleNotFound(String),
}

impl RefreshError {
    /// Whether the scheduler should retry ahead of the next regular tick
    pub fn is_retryable(&self) -> bool {
        match self {
            RefreshError::AccountContext(e) => e.is_transport(),
            RefreshError::Upstream { source, .. } => source.is_transport(),
            RefreshError::RotationFailed(_) => true,
            RefreshError::VehicleNotFound(_) => false,
        }
    }

    pub fn class(&self) -> Option<DataClass> {
        match self {
            RefreshError::Upstream { class, .. } => Some(*class),
            _ => None,
        }
    }
}

/// Failure of a one-shot remote command
#[derive(Debug, Clone, Error)]
pub enum CommandError {
    #[error("{command} failed: {source}")]
    Upstream {
        command: VehicleCommand,
        #[source]
        source: TelematicsError,
    },

    #[error("{command} was rejected by the vehicle")]
    Rejected { command: VehicleCommand },
}
