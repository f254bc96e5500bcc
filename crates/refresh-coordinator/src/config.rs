//! Coordinator Configuration

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use telematics_client::items;

use crate::error::ConfigError;
use crate::mode::Mode;
use crate::DataClass;

/// Upper bound for every configured duration (one year, in seconds)
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 3600;

/// Diagnostic items requested when none are configured
pub const DEFAULT_DIAGNOSTIC_ITEMS: &[&str] = &[
    items::ODOMETER,
    items::EV_BATTERY_LEVEL,
    items::EV_CHARGE_STATE,
    items::EV_PLUG_STATE,
    items::EV_PLUG_VOLTAGE,
    items::CHARGER_POWER_LEVEL,
    items::CHARGE_COMPLETE_TIME,
    items::LAST_TRIP_ELECTRIC_ECON,
    items::ENERGY_EFFICIENCY,
    items::VEHICLE_RANGE,
    items::TIRE_PRESSURE,
];

/// Named set of diagnostic fields requested on every diagnostics fetch.
///
/// Names are unique and non-blank. The request keeps the configured order,
/// but two sets with the same names compare equal regardless of order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct DiagnosticItems(Vec<String>);

impl DiagnosticItems {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|item| item == name)
    }
}

impl TryFrom<Vec<String>> for DiagnosticItems {
    type Error = ConfigError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        if names.is_empty() {
            return Err(ConfigError::NoDiagnosticItems);
        }
        let mut seen = HashSet::with_capacity(names.len());
        let mut items = Vec::with_capacity(names.len());
        for name in names {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ConfigError::BlankDiagnosticItem);
            }
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateDiagnosticItem(name));
            }
            items.push(name);
        }
        Ok(Self(items))
    }
}

impl From<DiagnosticItems> for Vec<String> {
    fn from(items: DiagnosticItems) -> Self {
        items.0
    }
}

impl Default for DiagnosticItems {
    fn default() -> Self {
        Self(DEFAULT_DIAGNOSTIC_ITEMS.iter().map(|s| s.to_string()).collect())
    }
}

impl PartialEq for DiagnosticItems {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().all(|item| other.contains(item))
    }
}

impl Eq for DiagnosticItems {}

/// Timing and request configuration for one coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Tick interval in standard mode (seconds)
    pub base_interval_secs: u64,
    /// Maximum age of cached location before refetching (seconds)
    pub location_ttl_secs: u64,
    /// Maximum age of cached diagnostics before refetching (seconds)
    pub diagnostics_ttl_secs: u64,
    /// Start in workaround mode (rotate identity on rate limit). Opt-in.
    pub workaround_mode: bool,
    /// Tick interval in workaround mode (seconds)
    pub workaround_interval_secs: u64,
    /// How long a rate-limited data class stays suppressed (seconds)
    pub standard_backoff_secs: u64,
    /// Limit for a single upstream call (seconds)
    pub call_timeout_secs: u64,
    /// First scheduler retry delay after a transport failure (seconds)
    pub retry_base_secs: u64,
    pub diagnostic_items: DiagnosticItems,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            base_interval_secs: 1800,   // 30 minutes
            location_ttl_secs: 1800,
            diagnostics_ttl_secs: 1800,
            workaround_mode: false,
            workaround_interval_secs: 120,
            standard_backoff_secs: 86_400, // 24 hours
            call_timeout_secs: 60,
            retry_base_secs: 30,
            diagnostic_items: DiagnosticItems::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Check the combination of values; called before a coordinator is built
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("base_interval_secs", self.base_interval_secs),
            ("location_ttl_secs", self.location_ttl_secs),
            ("diagnostics_ttl_secs", self.diagnostics_ttl_secs),
            ("workaround_interval_secs", self.workaround_interval_secs),
            ("standard_backoff_secs", self.standard_backoff_secs),
            ("call_timeout_secs", self.call_timeout_secs),
            ("retry_base_secs", self.retry_base_secs),
        ];
        for (name, value) in durations {
            if value == 0 {
                return Err(ConfigError::ZeroDuration(name));
            }
            if value > MAX_DURATION_SECS {
                return Err(ConfigError::DurationTooLong {
                    name,
                    max: MAX_DURATION_SECS,
                });
            }
        }

        if self.workaround_interval_secs >= self.base_interval_secs {
            return Err(ConfigError::WorkaroundNotFaster {
                workaround: self.workaround_interval_secs,
                base: self.base_interval_secs,
            });
        }

        if self.diagnostic_items.is_empty() {
            return Err(ConfigError::NoDiagnosticItems);
        }

        Ok(())
    }

    pub fn initial_mode(&self) -> Mode {
        if self.workaround_mode {
            Mode::Workaround
        } else {
            Mode::Standard
        }
    }

    /// Tick interval for a mode
    pub fn interval(&self, mode: Mode) -> Duration {
        match mode {
            Mode::Standard => Duration::from_secs(self.base_interval_secs),
            Mode::Workaround => Duration::from_secs(self.workaround_interval_secs),
        }
    }

    /// Staleness window for a data class. Workaround mode caps it at the
    /// workaround interval so every tick can refresh.
    pub fn ttl(&self, class: DataClass, mode: Mode) -> Duration {
        let configured = match class {
            DataClass::Location => self.location_ttl_secs,
            DataClass::Diagnostics => self.diagnostics_ttl_secs,
        };
        let secs = match mode {
            Mode::Standard => configured,
            Mode::Workaround => configured.min(self.workaround_interval_secs),
        };
        Duration::from_secs(secs)
    }

    pub fn standard_backoff(&self) -> Duration {
        Duration::from_secs(self.standard_backoff_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_secs(self.retry_base_secs)
    }
}
