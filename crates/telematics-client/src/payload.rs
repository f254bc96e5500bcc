//! Upstream Payload Types
//!
//! The upstream API wraps every answer in a `commandResponse` envelope. The
//! decoders here pull the interesting part out of that envelope and report a
//! [`TelematicsError::Protocol`] when the shape is not what we expect.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::TelematicsError;

/// Vehicle position reported by the location endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPayload {
    pub latitude: f64,
    pub longitude: f64,
}

impl LocationPayload {
    /// Decode `commandResponse.body.location`
    pub fn from_response(response: &Value) -> Result<Self, TelematicsError> {
        let location = response
            .pointer("/commandResponse/body/location")
            .ok_or_else(|| TelematicsError::protocol("location", response))?;

        let latitude = location.get("latitude").and_then(numeric);
        let longitude = location.get("longitude").and_then(numeric);

        match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => Ok(Self {
                latitude,
                longitude,
            }),
            _ => Err(TelematicsError::protocol("location", location)),
        }
    }
}

/// One element of a diagnostic entry (e.g. `TIRE PRESSURE LF`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticElement {
    pub name: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub value: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A named diagnostic item with its elements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEntry {
    pub name: String,
    #[serde(rename = "diagnosticElement", default)]
    pub elements: Vec<DiagnosticElement>,
}

/// Diagnostic readings returned for a requested item list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsPayload {
    pub entries: Vec<DiagnosticEntry>,
}

impl DiagnosticsPayload {
    /// Decode `commandResponse.body.diagnosticResponse`
    pub fn from_response(response: &Value) -> Result<Self, TelematicsError> {
        let body = response
            .pointer("/commandResponse/body/diagnosticResponse")
            .filter(|v| v.is_array())
            .ok_or_else(|| TelematicsError::protocol("diagnostics", response))?;

        let entries: Vec<DiagnosticEntry> = serde_json::from_value(body.clone())
            .map_err(|_| TelematicsError::protocol("diagnostics", body))?;

        Ok(Self { entries })
    }

    pub fn entry(&self, name: &str) -> Option<&DiagnosticEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    /// Value of the first element of the named entry
    pub fn value(&self, name: &str) -> Option<&str> {
        self.entry(name)?
            .elements
            .first()?
            .value
            .as_deref()
    }

    pub fn element(&self, name: &str, element: &str) -> Option<&DiagnosticElement> {
        self.entry(name)?.elements.iter().find(|e| e.name == element)
    }

    pub fn element_value(&self, name: &str, element: &str) -> Option<&str> {
        self.element(name, element)?.value.as_deref()
    }
}

/// A vehicle registered to the account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub vin: String,
    pub year: String,
    pub make: String,
    pub model: String,
}

impl Vehicle {
    pub fn display_name(&self) -> String {
        format!("{} {} {}", self.year, self.make, self.model)
    }
}

/// Account-level context that must be valid before any vehicle call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountContext {
    pub vehicles: Vec<Vehicle>,
}

impl AccountContext {
    /// Decode `vehicles.vehicle`
    pub fn from_response(response: &Value) -> Result<Self, TelematicsError> {
        let list = response
            .pointer("/vehicles/vehicle")
            .and_then(Value::as_array)
            .ok_or_else(|| TelematicsError::protocol("account vehicles", response))?;

        let vehicles = list
            .iter()
            .map(|v| {
                let field = |key: &str| v.get(key).and_then(text);
                match (field("vin"), field("year"), field("make"), field("model")) {
                    (Some(vin), Some(year), Some(make), Some(model)) => Ok(Vehicle {
                        vin,
                        year,
                        make,
                        model,
                    }),
                    _ => Err(TelematicsError::protocol("account vehicle", v)),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { vehicles })
    }

    /// The vehicle with this VIN, compared case-insensitively
    pub fn vehicle(&self, vin: &str) -> Option<&Vehicle> {
        self.vehicles.iter().find(|v| v.vin.eq_ignore_ascii_case(vin))
    }

    pub fn has_vehicle(&self, vin: &str) -> bool {
        self.vehicle(vin).is_some()
    }
}

/// Remote commands that change vehicle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleCommand {
    LockDoor,
    UnlockDoor,
    Start,
    CancelStart,
}

impl VehicleCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleCommand::LockDoor => "lock_door",
            VehicleCommand::UnlockDoor => "unlock_door",
            VehicleCommand::Start => "start",
            VehicleCommand::CancelStart => "cancel_start",
        }
    }
}

impl fmt::Display for VehicleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lock_door" | "lock" => Ok(VehicleCommand::LockDoor),
            "unlock_door" | "unlock" => Ok(VehicleCommand::UnlockDoor),
            "start" => Ok(VehicleCommand::Start),
            "cancel_start" | "stop" => Ok(VehicleCommand::CancelStart),
            other => Err(format!("unknown vehicle command: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Success,
    Failure,
}

/// Outcome reported by the upstream for a remote command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: VehicleCommand,
    pub status: CommandStatus,
}

impl CommandResult {
    /// Decode `commandResponse.status`; anything but `success` is a failure
    pub fn from_response(command: VehicleCommand, response: &Value) -> Result<Self, TelematicsError> {
        let status = response
            .pointer("/commandResponse/status")
            .and_then(Value::as_str)
            .ok_or_else(|| TelematicsError::protocol(command.as_str(), response))?;

        let status = if status == "success" {
            CommandStatus::Success
        } else {
            CommandStatus::Failure
        };
        Ok(Self { command, status })
    }

    pub fn is_success(&self) -> bool {
        self.status == CommandStatus::Success
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(text))
}
