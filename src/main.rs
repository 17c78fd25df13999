//! # Edge Gateway - Main Entry Point
//!
//! Authenticating gateway that sits in front of the backend services. Every
//! request is checked against the path policy; protected requests must carry a
//! valid bearer token, whose claims are forwarded upstream as `X-User-*` headers.
//!
//! ## Startup sequence
//! 1. Load configuration (`GATEWAY_CONFIG_PATH`, default `config/gateway.yaml`)
//! 2. Install logging and, if enabled, the Prometheus exporter
//! 3. Build the server and serve until SIGTERM or SIGINT

use tokio::signal;
use tracing::{error, info};

use edge_gateway::core::config::LoggingConfig;
use edge_gateway::observability::{init_logging, install_prometheus_exporter};
use edge_gateway::{GatewayConfig, GatewayError, GatewayResult, GatewayServer};

const DEFAULT_CONFIG_PATH: &str = "config/gateway.yaml";

#[tokio::main]
async fn main() -> GatewayResult<()> {
    let config_path =
        std::env::var("GATEWAY_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let config = match GatewayConfig::load_from_file(&config_path).await {
        Ok(config) => config,
        Err(e) => {
            init_logging(&LoggingConfig::default())?;
            error!("Failed to load configuration from {}: {}", config_path, e);
            std::process::exit(1);
        }
    };

    init_logging(&config.observability.logging)?;
    info!("🚀 Starting Edge Gateway");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("📋 Configuration loaded from {}", config_path);

    install_prometheus_exporter(&config.observability.metrics)?;

    let server = match GatewayServer::from_config(config) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start gateway: {}", e);
            std::process::exit(1);
        }
    };

    server.start_with_shutdown(shutdown_signal()).await?;

    info!("✅ Edge Gateway shutdown complete");
    Ok(())
}

/// Resolves on the first SIGTERM or SIGINT
async fn shutdown_signal() {
    if let Err(e) = wait_for_signal().await {
        error!("Failed to install signal handlers: {}", e);
        std::future::pending::<()>().await;
    }
    info!("🛑 Shutdown signal received, draining in-flight requests...");
}

#[cfg(unix)]
async fn wait_for_signal() -> GatewayResult<()> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .map_err(|e| GatewayError::internal(format!("SIGTERM handler: {}", e)))?;
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .map_err(|e| GatewayError::internal(format!("SIGINT handler: {}", e)))?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> GatewayResult<()> {
    signal::ctrl_c()
        .await
        .map_err(|e| GatewayError::internal(format!("Ctrl-C handler: {}", e)))
}
