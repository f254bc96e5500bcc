//! Per-class rate-limit backoff

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::MAX_DURATION_SECS;
use crate::DataClass;

/// Tracks "do not fetch until" deadlines per data class.
///
/// A class with no entry has no backoff in effect.
#[derive(Debug, Default, Clone)]
pub struct BackoffTracker {
    until: HashMap<DataClass, Instant>,
}

impl BackoffTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_backed_off(&self, class: DataClass) -> bool {
        self.until
            .get(&class)
            .map_or(false, |until| Instant::now() < *until)
    }

    /// Suppress fetches for `class` for `duration`, returning the deadline.
    /// Durations beyond the configurable maximum are clamped to it.
    pub fn set_backoff(&mut self, class: DataClass, duration: Duration) -> Instant {
        let duration = duration.min(Duration::from_secs(MAX_DURATION_SECS));
        let now = Instant::now();
        let until = now.checked_add(duration).unwrap_or(now);
        warn!(%class, backoff_secs = duration.as_secs(), "Backing off after rate limit");
        self.until.insert(class, until);
        until
    }

    pub fn clear(&mut self, class: DataClass) {
        if self.until.remove(&class).is_some() {
            debug!(%class, "Backoff cleared");
        }
    }

    pub fn until(&self, class: DataClass) -> Option<Instant> {
        self.until.get(&class).copied()
    }

    /// Time left until fetches resume, zero when not backed off
    pub fn remaining(&self, class: DataClass) -> Duration {
        self.until(class)
            .map(|until| until.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test(start_paused = true)]
    async fn test_backoff_expires() {
        let mut tracker = BackoffTracker::new();
        assert!(!tracker.is_backed_off(DataClass::Location));

        let until = tracker.set_backoff(DataClass::Location, Duration::from_secs(86_400));
        assert_eq!(until, Instant::now() + Duration::from_secs(86_400));
        assert!(tracker.is_backed_off(DataClass::Location));
        assert!(!tracker.is_backed_off(DataClass::Diagnostics));

        tokio::time::advance(Duration::from_secs(86_399)).await;
        assert!(tracker.is_backed_off(DataClass::Location));
        assert_eq!(tracker.remaining(DataClass::Location), Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!tracker.is_backed_off(DataClass::Location));
        assert_eq!(tracker.remaining(DataClass::Location), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear() {
        let mut tracker = BackoffTracker::new();
        tracker.set_backoff(DataClass::Diagnostics, Duration::from_secs(60));
        tracker.clear(DataClass::Diagnostics);
        assert!(!tracker.is_backed_off(DataClass::Diagnostics));
        assert!(tracker.until(DataClass::Diagnostics).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_backoff_clamped() {
        let mut tracker = BackoffTracker::new();
        let until = tracker.set_backoff(DataClass::Location, Duration::MAX);
        assert_eq!(until, Instant::now() + Duration::from_secs(MAX_DURATION_SECS));
        assert!(tracker.is_backed_off(DataClass::Location));
    }

    proptest! {
        #[test]
        fn prop_any_backoff_is_representable(secs in any::<u64>()) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            rt.block_on(async {
                let mut tracker = BackoffTracker::new();
                let until = tracker.set_backoff(DataClass::Diagnostics, Duration::from_secs(secs));
                prop_assert!(until >= Instant::now());
                prop_assert!(tracker.remaining(DataClass::Diagnostics) <= Duration::from_secs(MAX_DURATION_SECS));
                prop_assert_eq!(tracker.is_backed_off(DataClass::Diagnostics), secs > 0);
                Ok(())
            })?;
        }

        #[test]
        fn prop_backed_off_until_deadline(secs in 1u64..1_000_000, elapsed in 0u64..2_000_000) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            rt.block_on(async {
                let mut tracker = BackoffTracker::new();
                tracker.set_backoff(DataClass::Location, Duration::from_secs(secs));
                tokio::time::advance(Duration::from_secs(elapsed)).await;
                prop_assert_eq!(tracker.is_backed_off(DataClass::Location), elapsed < secs);
                Ok(())
            })?;
        }
    }
}
