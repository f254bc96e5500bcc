//! Diagnostic sensors
//!
//! Every sensor is a pure function of the diagnostics payload. A value that
//! is missing or does not convert reads as `None`; it never fails the
//! snapshot.

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc, Weekday};
use refresh_coordinator::Snapshot;
use serde::Serialize;
use std::collections::BTreeMap;
use telematics_client::{items, DiagnosticsPayload};
use tracing::debug;

use crate::{KMPLE_TO_MPGE, KWH_PER_100KM_TO_KWH_PER_100MI};

const CHARGE_COMPLETE_DAY: &str = "HV BATTERY CHARGE COMPLETE DAY";
const CHARGE_COMPLETE_HOUR: &str = "HV BATTERY CHARGE COMPLETE HOUR";
const CHARGE_COMPLETE_MINUTE: &str = "HV BATTERY CHARGE COMPLETE MINUTE";
const LIFETIME_EFFICIENCY: &str = "LIFETIME EFFICIENCY";
const EV_RANGE: &str = "EV RANGE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TirePosition {
    Lf,
    Rf,
    Lr,
    Rr,
}

impl TirePosition {
    pub const ALL: [TirePosition; 4] = [TirePosition::Lf, TirePosition::Rf, TirePosition::Lr, TirePosition::Rr];

    fn code(&self) -> &'static str {
        match self {
            TirePosition::Lf => "LF",
            TirePosition::Rf => "RF",
            TirePosition::Lr => "LR",
            TirePosition::Rr => "RR",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TirePosition::Lf => "Left Front",
            TirePosition::Rf => "Right Front",
            TirePosition::Lr => "Left Rear",
            TirePosition::Rr => "Right Rear",
        }
    }

    fn element_name(&self) -> String {
        format!("TIRE PRESSURE {}", self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Odometer,
    BatteryLevel,
    ChargeState,
    PlugState,
    PlugVoltage,
    ChargerPowerLevel,
    ChargeCompleteTime,
    LastTripEfficiency,
    LifetimeEfficiency,
    EvRange,
    TirePressure(TirePosition),
}

/// Sensors that only exist on electric vehicles
const EV_SENSORS: [SensorKind; 9] = [
    SensorKind::BatteryLevel,
    SensorKind::ChargeState,
    SensorKind::PlugState,
    SensorKind::PlugVoltage,
    SensorKind::ChargerPowerLevel,
    SensorKind::ChargeCompleteTime,
    SensorKind::LastTripEfficiency,
    SensorKind::LifetimeEfficiency,
    SensorKind::EvRange,
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SensorValue {
    Number(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub key: String,
    pub name: String,
    pub value: SensorValue,
    pub unit: Option<&'static str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<&'static str, SensorValue>,
}

impl SensorKind {
    pub fn key(&self) -> String {
        match self {
            SensorKind::Odometer => "odometer".into(),
            SensorKind::BatteryLevel => "battery_level".into(),
            SensorKind::ChargeState => "charge_state".into(),
            SensorKind::PlugState => "plug_state".into(),
            SensorKind::PlugVoltage => "plug_voltage".into(),
            SensorKind::ChargerPowerLevel => "charger_power_level".into(),
            SensorKind::ChargeCompleteTime => "charge_complete_time".into(),
            SensorKind::LastTripEfficiency => "last_trip_efficiency".into(),
            SensorKind::LifetimeEfficiency => "lifetime_efficiency".into(),
            SensorKind::EvRange => "ev_range".into(),
            SensorKind::TirePressure(position) => format!("tire_pressure_{}", position.code().to_lowercase()),
        }
    }

    pub fn name(&self) -> String {
        match self {
            SensorKind::Odometer => "Odometer".into(),
            SensorKind::BatteryLevel => "Battery Level".into(),
            SensorKind::ChargeState => "Charge State".into(),
            SensorKind::PlugState => "Plug State".into(),
            SensorKind::PlugVoltage => "Plug Voltage".into(),
            SensorKind::ChargerPowerLevel => "Charger Power Level".into(),
            SensorKind::ChargeCompleteTime => "Charge Complete Time".into(),
            SensorKind::LastTripEfficiency => "Last Trip Efficiency".into(),
            SensorKind::LifetimeEfficiency => "Lifetime Efficiency".into(),
            SensorKind::EvRange => "EV Range".into(),
            SensorKind::TirePressure(position) => format!("Tire Pressure {}", position.label()),
        }
    }

    pub fn unit(&self) -> Option<&'static str> {
        match self {
            SensorKind::Odometer | SensorKind::EvRange => Some("km"),
            SensorKind::BatteryLevel => Some("%"),
            SensorKind::PlugVoltage => Some("V"),
            SensorKind::LastTripEfficiency => Some("kmple"),
            SensorKind::LifetimeEfficiency => Some("kWh/100km"),
            SensorKind::TirePressure(_) => Some("kPa"),
            _ => None,
        }
    }

    /// Read this sensor from diagnostics. `now` anchors the charge-complete
    /// time to its next occurrence.
    pub fn read(&self, diagnostics: &DiagnosticsPayload, now: DateTime<Utc>) -> Option<SensorReading> {
        let mut attributes = BTreeMap::new();
        let value = match self {
            SensorKind::Odometer => number(diagnostics.value(items::ODOMETER))?,
            SensorKind::BatteryLevel => number(diagnostics.value(items::EV_BATTERY_LEVEL))?,
            SensorKind::PlugVoltage => number(diagnostics.value(items::EV_PLUG_VOLTAGE))?,
            SensorKind::ChargeState => {
                let state = match diagnostics.value(items::EV_CHARGE_STATE)? {
                    s @ ("charging" | "not_charging" | "fully_charged") => s,
                    _ => "unknown",
                };
                SensorValue::Text(state.to_string())
            }
            SensorKind::PlugState => {
                let state = match diagnostics.value(items::EV_PLUG_STATE)? {
                    s @ ("plugged" | "unplugged") => s,
                    _ => "unknown",
                };
                SensorValue::Text(state.to_string())
            }
            SensorKind::ChargerPowerLevel => {
                SensorValue::Text(diagnostics.value(items::CHARGER_POWER_LEVEL)?.to_string())
            }
            SensorKind::ChargeCompleteTime => SensorValue::Timestamp(charge_complete_time(diagnostics, now)?),
            SensorKind::LastTripEfficiency => {
                let kmple = parse(diagnostics.value(items::LAST_TRIP_ELECTRIC_ECON))?;
                attributes.insert("mpge", SensorValue::Number(kmple * KMPLE_TO_MPGE));
                SensorValue::Number(kmple)
            }
            SensorKind::LifetimeEfficiency => {
                let per_100km = parse(diagnostics.element_value(items::ENERGY_EFFICIENCY, LIFETIME_EFFICIENCY))?;
                attributes.insert(
                    "kwh_per_100mi",
                    SensorValue::Number(per_100km * KWH_PER_100KM_TO_KWH_PER_100MI),
                );
                SensorValue::Number(per_100km)
            }
            SensorKind::EvRange => number(diagnostics.element_value(items::VEHICLE_RANGE, EV_RANGE))?,
            SensorKind::TirePressure(position) => {
                let element = diagnostics.element(items::TIRE_PRESSURE, &position.element_name())?;
                if let Some(status) = &element.message {
                    attributes.insert("status", SensorValue::Text(status.clone()));
                }
                number(element.value.as_deref())?
            }
        };

        Some(SensorReading {
            key: self.key(),
            name: self.name(),
            value,
            unit: self.unit(),
            attributes,
        })
    }
}

fn parse(raw: Option<&str>) -> Option<f64> {
    let raw = raw?;
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => {
            debug!(raw, "Diagnostic value is not numeric");
            None
        }
    }
}

fn number(raw: Option<&str>) -> Option<SensorValue> {
    parse(raw).map(SensorValue::Number)
}

fn charge_complete_time(diagnostics: &DiagnosticsPayload, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let day = diagnostics.element_value(items::CHARGE_COMPLETE_TIME, CHARGE_COMPLETE_DAY)?;
    let hour = diagnostics.element_value(items::CHARGE_COMPLETE_TIME, CHARGE_COMPLETE_HOUR)?;
    let minute = diagnostics.element_value(items::CHARGE_COMPLETE_TIME, CHARGE_COMPLETE_MINUTE)?;

    let day: Weekday = day.trim().parse().ok()?;
    next_occurrence(now, day, hour.trim().parse().ok()?, minute.trim().parse().ok()?)
}

/// First instant strictly after `now` falling on `day` at `hour:minute` UTC
fn next_occurrence(now: DateTime<Utc>, day: Weekday, hour: u32, minute: u32) -> Option<DateTime<Utc>> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let days_ahead = (7 + day.num_days_from_monday() - now.weekday().num_days_from_monday()) % 7;
    let date = now.date_naive() + Duration::days(i64::from(days_ahead));
    let candidate = Utc.from_utc_datetime(&date.and_time(time));
    if candidate <= now {
        Some(candidate + Duration::days(7))
    } else {
        Some(candidate)
    }
}

/// A vehicle is electric iff its diagnostics report a battery level
pub fn is_electric_vehicle(diagnostics: &DiagnosticsPayload) -> bool {
    diagnostics.contains(items::EV_BATTERY_LEVEL)
}

/// Sensors that apply to this vehicle. Without diagnostics the vehicle is
/// treated as non-electric.
pub fn available_sensors(diagnostics: Option<&DiagnosticsPayload>) -> Vec<SensorKind> {
    let mut sensors = vec![SensorKind::Odometer];
    if diagnostics.map_or(false, is_electric_vehicle) {
        sensors.extend(EV_SENSORS);
    }
    sensors.extend(TirePosition::ALL.map(SensorKind::TirePressure));
    sensors
}

/// Every available sensor that currently has a value
pub fn read_all(snapshot: &Snapshot, now: DateTime<Utc>) -> Vec<SensorReading> {
    let Some(diagnostics) = snapshot.diagnostics.as_ref() else {
        return Vec::new();
    };
    available_sensors(Some(diagnostics))
        .iter()
        .filter_map(|sensor| sensor.read(diagnostics, now))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use refresh_coordinator::Mode;
    use serde_json::json;

    fn diagnostics() -> DiagnosticsPayload {
        let response = json!({
            "commandResponse": { "body": { "diagnosticResponse": [
                { "name": "ODOMETER", "diagnosticElement": [ { "name": "ODOMETER", "value": "15288.2", "unit": "KM" } ] },
                { "name": "EV BATTERY LEVEL", "diagnosticElement": [ { "name": "EV BATTERY LEVEL", "value": "78.5" } ] },
                { "name": "EV CHARGE STATE", "diagnosticElement": [ { "name": "EV CHARGE STATE", "value": "charging" } ] },
                { "name": "EV PLUG STATE", "diagnosticElement": [ { "name": "EV PLUG STATE", "value": "half_in" } ] },
                { "name": "EV PLUG VOLTAGE", "diagnosticElement": [ { "name": "EV PLUG VOLTAGE", "value": "n/a" } ] },
                { "name": "LAST TRIP ELECTRIC ECON", "diagnosticElement": [ { "name": "LAST TRIP ELECTRIC ECON", "value": "10" } ] },
                { "name": "ENERGY EFFICIENCY", "diagnosticElement": [
                    { "name": "ODOMETER", "value": "1" },
                    { "name": "LIFETIME EFFICIENCY", "value": "20" }
                ] },
                { "name": "HV BATTERY CHARGE COMPLETE TIME", "diagnosticElement": [
                    { "name": "HV BATTERY CHARGE COMPLETE DAY", "value": "Tuesday" },
                    { "name": "HV BATTERY CHARGE COMPLETE HOUR", "value": "6" },
                    { "name": "HV BATTERY CHARGE COMPLETE MINUTE", "value": "30" }
                ] },
                { "name": "TIRE PRESSURE", "diagnosticElement": [
                    { "name": "TIRE PRESSURE LF", "value": "262", "message": "GREEN" },
                    { "name": "TIRE PRESSURE RR", "value": "241", "message": "YELLOW" }
                ] }
            ] } }
        });
        DiagnosticsPayload::from_response(&response).unwrap()
    }

    fn monday_noon() -> DateTime<Utc> {
        // 2024-01-01 was a Monday
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_ev_detection() {
        assert!(is_electric_vehicle(&diagnostics()));
        assert!(!is_electric_vehicle(&DiagnosticsPayload::default()));

        assert_eq!(available_sensors(None).len(), 5);
        assert_eq!(available_sensors(Some(&diagnostics())).len(), 14);
    }

    #[test]
    fn test_numeric_sensors() {
        let diag = diagnostics();
        let reading = SensorKind::Odometer.read(&diag, monday_noon()).unwrap();
        assert_eq!(reading.value, SensorValue::Number(15288.2));
        assert_eq!(reading.unit, Some("km"));

        // Non-numeric values read as nothing
        assert!(SensorKind::PlugVoltage.read(&diag, monday_noon()).is_none());
        // Missing items read as nothing
        assert!(SensorKind::EvRange.read(&diag, monday_noon()).is_none());
    }

    #[test]
    fn test_enum_sensors() {
        let diag = diagnostics();
        let charge = SensorKind::ChargeState.read(&diag, monday_noon()).unwrap();
        assert_eq!(charge.value, SensorValue::Text("charging".into()));

        let plug = SensorKind::PlugState.read(&diag, monday_noon()).unwrap();
        assert_eq!(plug.value, SensorValue::Text("unknown".into()));
    }

    #[test]
    fn test_efficiency_conversions() {
        let diag = diagnostics();
        let trip = SensorKind::LastTripEfficiency.read(&diag, monday_noon()).unwrap();
        assert_eq!(trip.value, SensorValue::Number(10.0));
        match trip.attributes["mpge"] {
            SensorValue::Number(v) => assert!((v - 23.52).abs() < 1e-9),
            ref other => panic!("unexpected value {:?}", other),
        }

        // Looked up by element name, not position
        let lifetime = SensorKind::LifetimeEfficiency.read(&diag, monday_noon()).unwrap();
        assert_eq!(lifetime.value, SensorValue::Number(20.0));
        match lifetime.attributes["kwh_per_100mi"] {
            SensorValue::Number(v) => assert!((v - 32.18688).abs() < 1e-9),
            ref other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_tire_pressure_with_status() {
        let diag = diagnostics();
        let rr = SensorKind::TirePressure(TirePosition::Rr).read(&diag, monday_noon()).unwrap();
        assert_eq!(rr.key, "tire_pressure_rr");
        assert_eq!(rr.value, SensorValue::Number(241.0));
        assert_eq!(rr.attributes["status"], SensorValue::Text("YELLOW".into()));

        assert!(SensorKind::TirePressure(TirePosition::Rf).read(&diag, monday_noon()).is_none());
    }

    #[test]
    fn test_charge_complete_next_occurrence() {
        let reading = SensorKind::ChargeCompleteTime.read(&diagnostics(), monday_noon()).unwrap();
        assert_eq!(
            reading.value,
            SensorValue::Timestamp(Utc.with_ymd_and_hms(2024, 1, 2, 6, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_next_occurrence_wraps_week() {
        let now = monday_noon();
        assert_eq!(
            next_occurrence(now, Weekday::Mon, 11, 0),
            Some(Utc.with_ymd_and_hms(2024, 1, 8, 11, 0, 0).unwrap())
        );
        assert_eq!(
            next_occurrence(now, Weekday::Mon, 13, 0),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 13, 0, 0).unwrap())
        );
        assert_eq!(next_occurrence(now, Weekday::Fri, 24, 0), None);
    }

    #[test]
    fn test_read_all_from_snapshot() {
        assert!(read_all(&Snapshot::empty(Mode::Standard), monday_noon()).is_empty());

        let snapshot = Snapshot {
            diagnostics: Some(diagnostics()),
            ..Snapshot::empty(Mode::Standard)
        };
        let readings = read_all(&snapshot, monday_noon());
        let keys: Vec<&str> = readings.iter().map(|r| r.key.as_str()).collect();
        assert!(keys.contains(&"odometer"));
        assert!(keys.contains(&"charge_complete_time"));
        assert!(keys.contains(&"tire_pressure_lf"));
        assert!(!keys.contains(&"plug_voltage"));
    }

    #[test]
    fn test_reading_serializes_untagged() {
        let reading = SensorKind::Odometer.read(&diagnostics(), monday_noon()).unwrap();
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["value"], 15288.2);
        assert!(json.get("attributes").is_none());
    }
}
