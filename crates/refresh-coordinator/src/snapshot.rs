//! Snapshot publication
//!
//! The merged view is replaced as a whole: readers hold an `Arc` to either
//! the previous or the current snapshot, never a partially written one.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use telematics_client::{DiagnosticsPayload, LocationPayload};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::mode::Mode;

/// Latest merged view of all cached data classes
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Increases by one per publication; 0 until the first successful tick
    pub revision: u64,
    pub published_at: DateTime<Utc>,
    /// Mode of the tick that produced this snapshot
    pub mode: Mode,
    pub location: Option<LocationPayload>,
    pub location_updated_at: Option<DateTime<Utc>>,
    pub diagnostics: Option<DiagnosticsPayload>,
    pub diagnostics_updated_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub location_fetched_at: Option<Instant>,
    #[serde(skip)]
    pub diagnostics_fetched_at: Option<Instant>,
}

impl Snapshot {
    pub fn empty(mode: Mode) -> Self {
        Self {
            revision: 0,
            published_at: Utc::now(),
            mode,
            location: None,
            location_updated_at: None,
            diagnostics: None,
            diagnostics_updated_at: None,
            location_fetched_at: None,
            diagnostics_fetched_at: None,
        }
    }
}

/// Owner of the current snapshot
pub struct SnapshotStore {
    tx: watch::Sender<Arc<Snapshot>>,
}

impl SnapshotStore {
    pub fn new(initial: Snapshot) -> Self {
        let (tx, _) = watch::channel(Arc::new(initial));
        Self { tx }
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.tx.subscribe()
    }

    /// Replace the current snapshot, assigning the next revision. Only the
    /// coordinator publishes, one tick at a time.
    pub(crate) fn publish(&self, mut snapshot: Snapshot) -> Arc<Snapshot> {
        snapshot.revision = self.tx.borrow().revision + 1;
        snapshot.published_at = Utc::now();
        let next = Arc::new(snapshot);
        self.tx.send_replace(next.clone());
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn located(lat: f64) -> Snapshot {
        Snapshot {
            location: Some(LocationPayload {
                latitude: lat,
                longitude: -83.0,
            }),
            ..Snapshot::empty(Mode::Standard)
        }
    }

    #[tokio::test]
    async fn test_publish_increments_revision() {
        let store = SnapshotStore::new(Snapshot::empty(Mode::Standard));
        assert_eq!(store.current().revision, 0);
        assert!(store.current().location.is_none());

        let first = store.publish(located(42.0));
        assert_eq!(first.revision, 1);
        let second = store.publish(located(43.0));
        assert_eq!(second.revision, 2);
        assert_eq!(store.current().location.as_ref().unwrap().latitude, 43.0);
    }

    #[tokio::test]
    async fn test_reader_keeps_old_snapshot() {
        let store = SnapshotStore::new(Snapshot::empty(Mode::Standard));
        let held = store.publish(located(42.0));
        store.publish(located(43.0));

        // A reader holding the earlier Arc still sees a complete value
        assert_eq!(held.location.as_ref().unwrap().latitude, 42.0);
        assert_eq!(held.revision, 1);
    }

    #[tokio::test]
    async fn test_subscribers_notified() {
        let store = SnapshotStore::new(Snapshot::empty(Mode::Standard));
        let mut rx = store.subscribe();
        store.publish(located(42.0));

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().revision, 1);
    }

    #[test]
    fn test_serialization_skips_instants() {
        let json = serde_json::to_value(located(42.0)).unwrap();
        assert_eq!(json["location"]["latitude"], 42.0);
        assert!(json.get("location_fetched_at").is_none());
        assert_eq!(json["mode"], "standard");
    }
}
