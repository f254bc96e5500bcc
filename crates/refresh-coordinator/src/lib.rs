//! Telematics Refresh Coordinator
//!
//! Decides when to call the upstream telematics API, reacts to its rate
//! limiting, and serves two independently aged data classes (location and
//! diagnostics) from one scheduled refresh cycle.
//!
//! The latest merged view is published as an immutable [`Snapshot`] that any
//! number of readers can hold while the next tick runs.

mod backoff;
mod cache;
mod commands;
mod config;
mod coordinator;
mod error;
mod mode;
mod scheduler;
mod session;
mod snapshot;

pub use backoff::BackoffTracker;
pub use cache::StalenessCache;
pub use commands::CommandIssuer;
pub use config::{CoordinatorConfig, DiagnosticItems, DEFAULT_DIAGNOSTIC_ITEMS, MAX_DURATION_SECS};
pub use coordinator::{ClassStatus, RefreshCoordinator, TickOutcome, TickRecord, TickReport};
pub use error::{CommandError, ConfigError, RefreshError};
pub use mode::{Mode, ModeController, ModeState};
pub use scheduler::{retry_delay, RefreshScheduler};
pub use session::Session;
pub use snapshot::{Snapshot, SnapshotStore};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Independently cached classes of vehicle data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataClass {
    Location,
    Diagnostics,
}

impl DataClass {
    pub const ALL: [DataClass; 2] = [DataClass::Location, DataClass::Diagnostics];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataClass::Location => "location",
            DataClass::Diagnostics => "diagnostics",
        }
    }
}

impl fmt::Display for DataClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
