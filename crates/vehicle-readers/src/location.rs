//! Device tracker reading

use chrono::{DateTime, Utc};
use refresh_coordinator::Snapshot;
use serde::Serialize;

/// Position of the vehicle as last reported
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationReading {
    pub latitude: f64,
    pub longitude: f64,
    /// Always "gps" for this upstream
    pub source: &'static str,
    pub updated_at: Option<DateTime<Utc>>,
}

pub struct LocationTracker;

impl LocationTracker {
    pub fn read(snapshot: &Snapshot) -> Option<LocationReading> {
        let location = snapshot.location.as_ref()?;
        Some(LocationReading {
            latitude: location.latitude,
            longitude: location.longitude,
            source: "gps",
            updated_at: snapshot.location_updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refresh_coordinator::Mode;
    use telematics_client::LocationPayload;

    #[test]
    fn test_no_location_yet() {
        assert!(LocationTracker::read(&Snapshot::empty(Mode::Standard)).is_none());
    }

    #[test]
    fn test_reads_coordinates() {
        let snapshot = Snapshot {
            location: Some(LocationPayload {
                latitude: 42.331427,
                longitude: -83.045754,
            }),
            ..Snapshot::empty(Mode::Standard)
        };
        let reading = LocationTracker::read(&snapshot).unwrap();
        assert_eq!(reading.latitude, 42.331427);
        assert_eq!(reading.source, "gps");
    }
}
