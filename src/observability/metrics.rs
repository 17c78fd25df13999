//! # Metrics
//!
//! Counters recorded through the `metrics` facade. Without an installed recorder
//! they are no-ops, which is what tests and metrics-disabled deployments get.
//!
//! ```text
//! gateway_requests_total{method, status}
//! gateway_auth_outcomes_total{outcome}
//! gateway_error_responses_total{status}
//! ```

use axum::http::{Method, StatusCode};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

use crate::core::config::MetricsConfig;
use crate::core::error::{GatewayError, GatewayResult};

/// Start the Prometheus scrape endpoint when enabled
///
/// Must be called from within the tokio runtime.
pub fn install_prometheus_exporter(config: &MetricsConfig) -> GatewayResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config.listen_address.parse().map_err(|e| {
        GatewayError::config(format!(
            "Invalid metrics listen address '{}': {}",
            config.listen_address, e
        ))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| GatewayError::internal(format!("Failed to install Prometheus exporter: {}", e)))?;

    info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

pub fn record_request(method: &Method, status: StatusCode) {
    ::metrics::counter!(
        "gateway_requests_total",
        "method" => method.as_str().to_string(),
        "status" => status.as_u16().to_string()
    )
    .increment(1);
}

pub fn record_auth_outcome(outcome: &'static str) {
    ::metrics::counter!("gateway_auth_outcomes_total", "outcome" => outcome).increment(1);
}

pub fn record_error_response(status: StatusCode) {
    ::metrics::counter!(
        "gateway_error_responses_total",
        "status" => status.as_u16().to_string()
    )
    .increment(1);
}
