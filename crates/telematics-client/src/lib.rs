//! Telematics Client Boundary
//!
//! This crate defines the operations the refresh coordinator needs from the
//! upstream telematics API, the payloads those operations return, and a
//! scripted [`SimulatedClient`] for tests and offline runs.
//!
//! The concrete HTTP client for the vehicle vendor lives outside this
//! workspace; anything implementing [`TelematicsClient`] can be plugged in.

mod client;
mod error;
mod identity;
mod payload;
mod simulated;

pub use client::TelematicsClient;
pub use error::TelematicsError;
pub use identity::ClientIdentity;
pub use payload::{
    AccountContext, CommandResult, CommandStatus, DiagnosticElement, DiagnosticEntry,
    DiagnosticsPayload, LocationPayload, Vehicle, VehicleCommand,
};
pub use simulated::{CallCounts, Outcome, SimulatedClient};

/// Diagnostic item names understood by the upstream API
pub mod items {
    pub const ODOMETER: &str = "ODOMETER";
    pub const EV_BATTERY_LEVEL: &str = "EV BATTERY LEVEL";
    pub const EV_CHARGE_STATE: &str = "EV CHARGE STATE";
    pub const EV_PLUG_STATE: &str = "EV PLUG STATE";
    pub const EV_PLUG_VOLTAGE: &str = "EV PLUG VOLTAGE";
    pub const CHARGER_POWER_LEVEL: &str = "CHARGER POWER LEVEL";
    pub const CHARGE_COMPLETE_TIME: &str = "HV BATTERY CHARGE COMPLETE TIME";
    pub const LAST_TRIP_ELECTRIC_ECON: &str = "LAST TRIP ELECTRIC ECON";
    pub const ENERGY_EFFICIENCY: &str = "ENERGY EFFICIENCY";
    pub const VEHICLE_RANGE: &str = "VEHICLE RANGE";
    pub const TIRE_PRESSURE: &str = "TIRE PRESSURE";
}
