//! Telematics Bridge API Server
//!
//! Serves the coordinator's snapshot, sensor readings and remote commands
//! over HTTP, and runs the refresh scheduler alongside the server.

use anyhow::Context;
use axum::{
    routing::{get, post, put},
    Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use refresh_coordinator::{RefreshCoordinator, RefreshScheduler};
use std::net::SocketAddr;
use std::sync::Arc;
use telematics_client::{SimulatedClient, TelematicsClient};
use tokio::sync::oneshot;
use tower_governor::GovernorLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use vehicle_readers::{Actuator, Capability};

mod error;
mod rate_limit;
mod routes;
mod settings;

pub use error::ApiError;
pub use rate_limit::{create_governor_config, CommandGovernorConfig, RateLimitConfig};
pub use settings::{Settings, SettingsError, DEFAULT_CONFIG_FILE};

/// Application state shared across handlers
pub struct AppState<C> {
    pub coordinator: Arc<RefreshCoordinator<C>>,
    pub door_lock: Actuator<C>,
    pub remote_start: Actuator<C>,
    pub version: String,
    pub start_time: std::time::Instant,
    /// Absent when no Prometheus recorder was installed
    pub metrics: Option<PrometheusHandle>,
    /// Whether `PUT /api/v1/mode` may change the mode
    pub allow_mode_switch: bool,
}

impl<C: TelematicsClient> AppState<C> {
    pub fn new(coordinator: Arc<RefreshCoordinator<C>>, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            door_lock: Actuator::new(Capability::DoorLock, coordinator.commands()),
            remote_start: Actuator::new(Capability::RemoteStart, coordinator.commands()),
            coordinator,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
            metrics,
            allow_mode_switch: false,
        }
    }

    pub fn with_mode_switch(mut self, allowed: bool) -> Self {
        self.allow_mode_switch = allowed;
        self
    }

    pub fn actuator(&self, capability: Capability) -> &Actuator<C> {
        match capability {
            Capability::DoorLock => &self.door_lock,
            Capability::RemoteStart => &self.remote_start,
        }
    }
}

/// Create the application router
pub fn create_router<C: TelematicsClient>(
    state: Arc<AppState<C>>,
    command_limit: Arc<CommandGovernorConfig>,
) -> Router {
    let commands = Router::new()
        .route("/api/v1/vehicle/commands/:command", post(routes::commands::post_command::<C>))
        .layer(GovernorLayer {
            config: command_limit,
        });

    Router::new()
        .route("/api/v1/health", get(routes::health::get_health::<C>))
        .route("/api/v1/vehicle/snapshot", get(routes::vehicle::get_snapshot::<C>))
        .route("/api/v1/vehicle/location", get(routes::vehicle::get_location::<C>))
        .route("/api/v1/vehicle/sensors", get(routes::vehicle::get_sensors::<C>))
        .route("/api/v1/vehicle/actuators", get(routes::vehicle::get_actuators::<C>))
        .route("/api/v1/vehicle/refresh", post(routes::vehicle::post_refresh::<C>))
        .route("/api/v1/mode", put(routes::mode::put_mode::<C>))
        .route("/metrics", get(routes::health::get_metrics::<C>))
        .merge(commands)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Initialize logging. `RUST_LOG` overrides the default INFO level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        warn!("Tracing subscriber already installed");
    }
}

/// Run the scheduler and the server until Ctrl-C
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    // No vendor client ships in this workspace; the bridge serves simulated data
    warn!(vin = %settings.vin, "Using simulated telematics client");
    let client = SimulatedClient::new(&settings.vin);

    let coordinator =
        Arc::new(RefreshCoordinator::new(settings.coordinator.clone(), client)?.with_vin(&settings.vin));
    let state = Arc::new(
        AppState::new(coordinator.clone(), Some(metrics))
            .with_mode_switch(settings.allow_runtime_mode_switch),
    );
    let app = create_router(state, create_governor_config(&settings.commands)?);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let scheduler = tokio::spawn(RefreshScheduler::new(coordinator).run(async move {
        let _ = stop_rx.await;
    }));

    info!("Starting API server on {}", settings.bind_addr);
    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, shutting down scheduler");
    let _ = stop_tx.send(());
    scheduler.await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Ctrl-C received");
}
