//! FleetPulse Server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - FLEETPULSE_HOST: Bind address (default: 0.0.0.0)
//! - FLEETPULSE_PORT: Port number (default: 8080)
//! - FLEETPULSE_OFFLINE_SWEEP_SECS: Offline-detection interval (default: 120)
//! - FLEETPULSE_UPTIME_SWEEP_SECS: Uptime recompute interval (default: 300)
//! - RUST_LOG: Log level (default: info)

use fleetpulse::api::{run_server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetpulse=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse configuration from environment
    let host = std::env::var("FLEETPULSE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("FLEETPULSE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let offline_sweep_interval_secs = std::env::var("FLEETPULSE_OFFLINE_SWEEP_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(120);
    let uptime_sweep_interval_secs = std::env::var("FLEETPULSE_UPTIME_SWEEP_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(300);

    let config = ServerConfig {
        host,
        port,
        offline_sweep_interval_secs,
        uptime_sweep_interval_secs,
    };

    tracing::info!("FleetPulse configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    tracing::info!(
        "  Offline sweep interval: {} seconds",
        config.offline_sweep_interval_secs
    );
    tracing::info!(
        "  Uptime sweep interval: {} seconds",
        config.uptime_sweep_interval_secs
    );

    println!(
        r#"
  ______ _           _   _____      _
 |  ____| |         | | |  __ \    | |
 | |__  | | ___  ___| |_| |__) |   _| |___  ___
 |  __| | |/ _ \/ _ \ __|  ___/ | | | / __|/ _ \
 | |    | |  __/  __/ |_| |   | |_| | \__ \  __/
 |_|    |_|\___|\___|\__|_|    \__,_|_|___/\___|

 Point-of-Sale Fleet Telemetry Server
 Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );

    run_server(config).await
}
