//! Vehicle Readers
//!
//! Downstream consumers of the coordinator's snapshot. Readers are plain
//! functions of a [`Snapshot`](refresh_coordinator::Snapshot); actuators
//! pair a capability with the shared command issuer and keep an optimistic
//! state that only changes when the vehicle confirms a command.

mod actuator;
mod error;
mod location;
mod sensors;

pub use actuator::{Actuator, ActuatorState, Capability};
pub use error::ActuatorError;
pub use location::{LocationReading, LocationTracker};
pub use sensors::{
    available_sensors, is_electric_vehicle, read_all, SensorKind, SensorReading, SensorValue,
    TirePosition,
};

/// Miles-per-gallon-equivalent per kilometre-per-litre-equivalent
pub const KMPLE_TO_MPGE: f64 = 2.352;

/// kWh/100mi per kWh/100km
pub const KWH_PER_100KM_TO_KWH_PER_100MI: f64 = 1.609344;
