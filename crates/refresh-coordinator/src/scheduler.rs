//! Refresh Scheduler
//!
//! Drives the coordinator on a timer. The first tick runs immediately;
//! afterwards the next tick is due one interval after the previous one
//! finished. Retryable failures bring the next tick forward with an
//! exponential delay.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use telematics_client::TelematicsClient;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::coordinator::{RefreshCoordinator, TickOutcome};

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt - 1)`,
/// never longer than `cap`
pub fn retry_delay(base: Duration, attempt: u32, cap: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(cap)
}

pub struct RefreshScheduler<C> {
    coordinator: Arc<RefreshCoordinator<C>>,
}

impl<C: TelematicsClient> RefreshScheduler<C> {
    pub fn new(coordinator: Arc<RefreshCoordinator<C>>) -> Self {
        Self { coordinator }
    }

    /// Run until `shutdown` resolves, then close the upstream session.
    /// A tick that has started is allowed to finish.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut mode_rx = self.coordinator.mode_controller().subscribe();
        let mut interval = mode_rx.borrow_and_update().interval;
        let retry_base = self.coordinator.config().retry_base();

        let mut last_end = Instant::now();
        let mut next_at = last_end;
        let mut failures: u32 = 0;

        info!(interval_secs = interval.as_secs(), "Starting refresh scheduler");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                changed = mode_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = *mode_rx.borrow_and_update();
                    interval = state.interval;
                    let regular = last_end + interval;
                    // A pending retry keeps its earlier slot
                    next_at = if failures > 0 { next_at.min(regular) } else { regular };
                    info!(
                        mode = %state.mode,
                        interval_secs = interval.as_secs(),
                        "Tick interval updated"
                    );
                }
                _ = tokio::time::sleep_until(next_at) => {
                    let outcome = self.coordinator.tick().await;
                    last_end = Instant::now();

                    next_at = match &outcome {
                        TickOutcome::Failed { error, .. } if error.is_retryable() => {
                            failures += 1;
                            let delay = retry_delay(retry_base, failures, interval);
                            warn!(attempt = failures, delay_secs = delay.as_secs(), "Scheduling retry");
                            last_end + delay
                        }
                        _ => {
                            failures = 0;
                            last_end + interval
                        }
                    };
                    debug!(outcome = outcome.label(), "Next tick scheduled");
                }
            }
        }

        self.coordinator.close().await;
        info!("Refresh scheduler stopped");
    }
}
