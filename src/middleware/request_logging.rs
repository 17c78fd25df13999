use async_trait::async_trait;
use axum::response::Response;
use tracing::{info, warn};

use crate::core::error::GatewayResult;
use crate::core::types::IncomingRequest;
use crate::middleware::pipeline::{Next, Stage};
use crate::observability::metrics;

/// Logs one line per request with its outcome and latency
///
/// Headers are never logged; the `Authorization` value would end up in log storage.
#[derive(Debug, Default)]
pub struct RequestLoggingStage;

impl RequestLoggingStage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Stage for RequestLoggingStage {
    fn name(&self) -> &str {
        "request_logging"
    }

    async fn handle(&self, request: IncomingRequest, next: Next<'_>) -> GatewayResult<Response> {
        let method = request.method.clone();
        let path = request.path().to_string();
        let request_id = request.id.clone();
        let received_at = request.received_at;

        let result = next.run(request).await;
        let duration = received_at.elapsed();

        match &result {
            Ok(response) => {
                metrics::record_request(&method, response.status());
                info!(
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    status = response.status().as_u16(),
                    duration_ms = duration.as_millis() as u64,
                    "Request processed"
                );
            }
            Err(error) => {
                metrics::record_request(&method, error.status_code());
                warn!(
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    error = %error,
                    duration_ms = duration.as_millis() as u64,
                    "Request failed"
                );
            }
        }
        result
    }
}
