//! Telematics Bridge - Main Entry Point

use api::{init_logging, run_server, Settings};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    info!("=== Telematics Bridge v{} ===", env!("CARGO_PKG_VERSION"));

    // --config <path> wins over TELEMATICS_CONFIG
    let path = std::env::args()
        .skip_while(|arg| arg != "--config")
        .nth(1)
        .or_else(|| std::env::var("TELEMATICS_CONFIG").ok());

    let settings = Settings::load(path.as_deref())?;
    info!(
        vin = %settings.vin,
        mode = %settings.coordinator.initial_mode(),
        "Settings loaded"
    );

    run_server(settings).await
}
