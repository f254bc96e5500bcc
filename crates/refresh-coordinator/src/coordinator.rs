//! Refresh Coordinator
//!
//! Runs one refresh cycle at a time: re-establish the session if a previous
//! rotation lost it, validate the account context, refresh
//! location then diagnostics (each through its staleness cache and backoff
//! gate), and publish the merged snapshot.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use telematics_client::{
    AccountContext, DiagnosticsPayload, LocationPayload, TelematicsClient, TelematicsError,
};
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::backoff::BackoffTracker;
use crate::cache::StalenessCache;
use crate::commands::CommandIssuer;
use crate::config::{CoordinatorConfig, DiagnosticItems};
use crate::error::{ConfigError, RefreshError};
use crate::mode::{Mode, ModeController};
use crate::session::Session;
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::DataClass;

/// What happened to one data class during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassStatus {
    /// New value fetched and cached
    Fetched,
    /// Cached value still within its staleness window
    Cached,
    /// Skipped because a standard-mode backoff is in effect
    BackedOff,
    /// Upstream rate limited the fetch; cached value served
    RateLimited,
    /// Fetch failed; cached value untouched
    Failed,
    /// The tick ended before this class was reached
    NotAttempted,
}

/// Per-class results of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub mode: Mode,
    pub location: ClassStatus,
    pub diagnostics: ClassStatus,
}

impl TickReport {
    fn new(mode: Mode) -> Self {
        Self {
            mode,
            location: ClassStatus::NotAttempted,
            diagnostics: ClassStatus::NotAttempted,
        }
    }

    pub fn status(&self, class: DataClass) -> ClassStatus {
        match class {
            DataClass::Location => self.location,
            DataClass::Diagnostics => self.diagnostics,
        }
    }

    fn set(&mut self, class: DataClass, status: ClassStatus) {
        match class {
            DataClass::Location => self.location = status,
            DataClass::Diagnostics => self.diagnostics = status,
        }
    }
}

/// Result of [`RefreshCoordinator::tick`]
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// A new snapshot was published
    Refreshed { revision: u64, report: TickReport },
    /// The previous snapshot was kept. Classes refreshed before the failure
    /// stay committed to their caches.
    Failed { error: RefreshError, report: TickReport },
    /// Another tick was still running
    Skipped,
}

impl TickOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TickOutcome::Refreshed { .. } => "refreshed",
            TickOutcome::Failed { .. } => "failed",
            TickOutcome::Skipped => "skipped",
        }
    }

    pub fn error(&self) -> Option<&RefreshError> {
        match self {
            TickOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn report(&self) -> Option<&TickReport> {
        match self {
            TickOutcome::Refreshed { report, .. } | TickOutcome::Failed { report, .. } => Some(report),
            TickOutcome::Skipped => None,
        }
    }

    /// Failed in a way the scheduler should retry early
    pub fn is_retryable_failure(&self) -> bool {
        self.error().map_or(false, RefreshError::is_retryable)
    }
}

/// Summary of the last completed tick, for health reporting
#[derive(Debug, Clone, Serialize)]
pub struct TickRecord {
    pub outcome: &'static str,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub revision: Option<u64>,
    pub report: Option<TickReport>,
    pub error: Option<String>,
}

struct RefreshState {
    location: StalenessCache<LocationPayload>,
    diagnostics: StalenessCache<DiagnosticsPayload>,
    backoff: BackoffTracker,
}

type FetchFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TelematicsError>> + Send + 'a>>;

/// A data class payload and the upstream call that produces it
trait ClassData: Clone + Send + Sync + 'static {
    const CLASS: DataClass;

    fn fetch<'a, C: TelematicsClient>(session: &'a Session<C>, items: &'a DiagnosticItems) -> FetchFuture<'a, Self>;
}

impl ClassData for LocationPayload {
    const CLASS: DataClass = DataClass::Location;

    fn fetch<'a, C: TelematicsClient>(session: &'a Session<C>, _items: &'a DiagnosticItems) -> FetchFuture<'a, Self> {
        Box::pin(session.fetch_location())
    }
}

impl ClassData for DiagnosticsPayload {
    const CLASS: DataClass = DataClass::Diagnostics;

    fn fetch<'a, C: TelematicsClient>(session: &'a Session<C>, items: &'a DiagnosticItems) -> FetchFuture<'a, Self> {
        Box::pin(session.fetch_diagnostics(items.as_slice()))
    }
}

/// Why a fetch produced no new value
enum FetchFailure {
    RateLimited,
    RotationFailed(TelematicsError),
    Upstream(TelematicsError),
}

pub struct RefreshCoordinator<C> {
    config: CoordinatorConfig,
    session: Arc<Session<C>>,
    modes: ModeController<C>,
    snapshots: SnapshotStore,
    state: Mutex<RefreshState>,
    last_tick: watch::Sender<Option<TickRecord>>,
    /// Vehicle that must be on the account, when known
    vin: Option<String>,
}

impl<C: TelematicsClient> RefreshCoordinator<C> {
    /// Build a coordinator around an already constructed client
    pub fn new(config: CoordinatorConfig, client: C) -> Result<Self, ConfigError> {
        config.validate()?;

        let session = Arc::new(Session::new(client, config.call_timeout()));
        let modes = ModeController::new(&config, session.clone());
        let snapshots = SnapshotStore::new(Snapshot::empty(modes.mode()));
        let (last_tick, _) = watch::channel(None);

        info!(
            base_interval_secs = config.base_interval_secs,
            workaround_interval_secs = config.workaround_interval_secs,
            diagnostic_items = config.diagnostic_items.len(),
            mode = %modes.mode(),
            "Refresh coordinator created"
        );

        Ok(Self {
            config,
            session,
            modes,
            snapshots,
            state: Mutex::new(RefreshState {
                location: StalenessCache::new(),
                diagnostics: StalenessCache::new(),
                backoff: BackoffTracker::new(),
            }),
            last_tick,
            vin: None,
        })
    }

    /// Require `vin` to be registered to the account on every tick
    pub fn with_vin(mut self, vin: impl Into<String>) -> Self {
        self.vin = Some(vin.into());
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshots.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshots.subscribe()
    }

    pub fn mode_controller(&self) -> &ModeController<C> {
        &self.modes
    }

    /// Issuer for remote commands sharing this coordinator's session
    pub fn commands(&self) -> CommandIssuer<C> {
        CommandIssuer::new(self.session.clone())
    }

    pub fn last_tick(&self) -> Option<TickRecord> {
        self.last_tick.borrow().clone()
    }

    /// Release the upstream session
    pub async fn close(&self) {
        self.session.close().await;
    }

    /// Run one refresh cycle. Returns `Skipped` without doing anything if a
    /// tick is already running.
    pub async fn tick(&self) -> TickOutcome {
        let Ok(mut state) = self.state.try_lock() else {
            debug!("Tick already in progress, skipping");
            counter!("telematics_ticks_total", "outcome" => "skipped").increment(1);
            return TickOutcome::Skipped;
        };

        // Later mode changes apply from the next tick on
        let mode = self.modes.mode();
        let started = Instant::now();
        let mut report = TickReport::new(mode);
        debug!(%mode, "Tick started");

        let mut rotation_used = false;
        let account = if self.session.is_lost() {
            // Uses up this tick's one rotation
            rotation_used = true;
            info!("Re-establishing upstream session lost in an earlier rotation");
            self.modes
                .rotate_identity()
                .await
                .map_err(RefreshError::RotationFailed)
        } else {
            self.session
                .account_context()
                .await
                .map_err(RefreshError::AccountContext)
        };
        if let Err(error) = account.and_then(|account| self.check_vehicle(&account)) {
            return self.finish(started, TickOutcome::Failed { error, report });
        }

        let RefreshState {
            location,
            diagnostics,
            backoff,
        } = &mut *state;
        let mut failure = None;

        match self.refresh_class(location, backoff, mode, &mut rotation_used).await {
            Ok(status) => report.set(DataClass::Location, status),
            Err(e) => {
                report.set(DataClass::Location, ClassStatus::Failed);
                failure.get_or_insert(e);
            }
        }
        match self.refresh_class(diagnostics, backoff, mode, &mut rotation_used).await {
            Ok(status) => report.set(DataClass::Diagnostics, status),
            Err(e) => {
                report.set(DataClass::Diagnostics, ClassStatus::Failed);
                failure.get_or_insert(e);
            }
        }

        let outcome = match failure {
            Some(error) => TickOutcome::Failed { error, report },
            None => {
                let snapshot = self.snapshots.publish(Snapshot {
                    location: location.value().cloned(),
                    location_updated_at: wall_clock(location.fetched_at()),
                    location_fetched_at: location.fetched_at(),
                    diagnostics: diagnostics.value().cloned(),
                    diagnostics_updated_at: wall_clock(diagnostics.fetched_at()),
                    diagnostics_fetched_at: diagnostics.fetched_at(),
                    ..Snapshot::empty(mode)
                });
                TickOutcome::Refreshed {
                    revision: snapshot.revision,
                    report,
                }
            }
        };
        self.finish(started, outcome)
    }

    fn check_vehicle(&self, account: &AccountContext) -> Result<(), RefreshError> {
        let Some(vin) = self.vin.as_deref() else {
            return Ok(());
        };
        match account.vehicle(vin) {
            Some(vehicle) => {
                debug!(vin, vehicle = %vehicle.display_name(), "Vehicle found on account");
                Ok(())
            }
            None => Err(RefreshError::VehicleNotFound(vin.to_string())),
        }
    }

    fn finish(&self, started: Instant, outcome: TickOutcome) -> TickOutcome {
        let elapsed = started.elapsed();
        counter!("telematics_ticks_total", "outcome" => outcome.label()).increment(1);

        let revision = match &outcome {
            TickOutcome::Refreshed { revision, report } => {
                info!(
                    revision,
                    location = ?report.location,
                    diagnostics = ?report.diagnostics,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Tick complete"
                );
                Some(*revision)
            }
            TickOutcome::Failed { error, .. } => {
                error!(error = %error, retryable = error.is_retryable(), "Tick failed");
                None
            }
            TickOutcome::Skipped => None,
        };

        self.last_tick.send_replace(Some(TickRecord {
            outcome: outcome.label(),
            finished_at: Utc::now(),
            duration_ms: elapsed.as_millis() as u64,
            revision,
            report: outcome.report().copied(),
            error: outcome.error().map(ToString::to_string),
        }));
        outcome
    }

    /// Bring one class up to date, leaving its cache untouched on any failure
    async fn refresh_class<T: ClassData>(
        &self,
        cache: &mut StalenessCache<T>,
        backoff: &mut BackoffTracker,
        mode: Mode,
        rotation_used: &mut bool,
    ) -> Result<ClassStatus, RefreshError> {
        let class = T::CLASS;

        if mode == Mode::Standard && backoff.is_backed_off(class) {
            debug!(%class, remaining_secs = backoff.remaining(class).as_secs(), "Backed off, serving cache");
            return Ok(ClassStatus::BackedOff);
        }

        let ttl = self.config.ttl(class, mode);
        if cache.is_fresh(ttl) {
            debug!(%class, "Cache fresh");
            return Ok(ClassStatus::Cached);
        }

        let result = cache
            .get_or_refresh(ttl, move || self.fetch_with_workaround::<T>(mode, rotation_used))
            .await;

        match result {
            Ok(_) => {
                backoff.clear(class);
                Ok(ClassStatus::Fetched)
            }
            Err(FetchFailure::RateLimited) => {
                backoff.set_backoff(class, self.config.standard_backoff());
                Ok(ClassStatus::RateLimited)
            }
            Err(FetchFailure::RotationFailed(e)) => {
                backoff.set_backoff(class, self.config.standard_backoff());
                Err(RefreshError::RotationFailed(e))
            }
            Err(FetchFailure::Upstream(source)) => {
                warn!(%class, error = %source, "Fetch failed, cache left untouched");
                Err(RefreshError::Upstream { class, source })
            }
        }
    }

    /// Fetch once; in workaround mode a rate limit triggers one identity
    /// rotation per tick followed by a single retry.
    async fn fetch_with_workaround<T: ClassData>(&self, mode: Mode, rotation_used: &mut bool) -> Result<T, FetchFailure> {
        let class = T::CLASS;
        match self.fetch_counted::<T>().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_rate_limited() => return Err(FetchFailure::Upstream(e)),
            Err(_) => {}
        }

        if mode != Mode::Workaround || *rotation_used {
            return Err(FetchFailure::RateLimited);
        }

        *rotation_used = true;
        if let Err(e) = self.modes.rotate_identity().await {
            return Err(FetchFailure::RotationFailed(e));
        }

        info!(%class, "Retrying after identity rotation");
        match self.fetch_counted::<T>().await {
            Ok(value) => Ok(value),
            Err(e) if e.is_rate_limited() => Err(FetchFailure::RateLimited),
            Err(e) => Err(FetchFailure::Upstream(e)),
        }
    }

    async fn fetch_counted<T: ClassData>(&self) -> Result<T, TelematicsError> {
        let class = T::CLASS;
        counter!("telematics_upstream_calls_total", "class" => class.as_str()).increment(1);
        let result = T::fetch(&self.session, &self.config.diagnostic_items).await;
        if let Err(TelematicsError::RateLimited) = &result {
            counter!("telematics_rate_limited_total", "class" => class.as_str()).increment(1);
            warn!(%class, "Upstream rate limit hit");
        }
        result
    }
}

fn wall_clock(at: Option<Instant>) -> Option<DateTime<Utc>> {
    at.map(|at| {
        let age = Instant::now().saturating_duration_since(at);
        Utc::now() - chrono::Duration::from_std(age).unwrap_or_else(|_| chrono::Duration::zero())
    })
}
