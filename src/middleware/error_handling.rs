//! # Error Handling Middleware
//!
//! Central translation of gateway failures into the JSON error envelope:
//!
//! ```json
//! {"timestamp": "...", "status": 404, "error": "Not Found", "message": "Service not found", "path": "/x"}
//! ```
//!
//! Handlers and stages return [`GatewayError`]s. Their `IntoResponse` impl parks the
//! error on the response, and [`error_responder_middleware`] renders it here, where
//! the request path is known. Responses that were committed before the responder
//! ran are passed through untouched.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::any::Any;
use std::sync::Arc;
use tracing::{error, warn};

use crate::core::config::ErrorResponseConfig;
use crate::core::error::{ErrorKind, GatewayError, UnhandledFailure};
use crate::observability::metrics;

/// Body written when an error body itself cannot be serialized
pub const FALLBACK_ERROR_BODY: &str = r#"{"error":"Internal server error"}"#;

/// Serialize `value`, falling back to [`FALLBACK_ERROR_BODY`]
pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Bytes {
    match serde_json::to_vec(value) {
        Ok(bytes) => Bytes::from(bytes),
        Err(e) => {
            error!(error = %e, "Error creating JSON response");
            Bytes::from_static(FALLBACK_ERROR_BODY.as_bytes())
        }
    }
}

/// JSON response with the given status
pub fn json_response<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response {
    let mut response = Response::new(Body::from(render_json(value)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

/// Gateway-wide error body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEnvelope {
    pub timestamp: String,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub path: String,
}

/// Marks a response whose head is final
///
/// The upstream forwarder sets this on every relayed response because its body
/// is already streaming from the upstream. A failure parked on such a response
/// is not rendered; the response passes through untouched and the failure stays
/// attached for outer layers.
#[derive(Debug, Clone, Copy)]
pub struct ResponseCommitted;

/// Maps gateway failures to the error envelope
#[derive(Debug, Clone, Default)]
pub struct ErrorResponder {
    config: ErrorResponseConfig,
}

impl ErrorResponder {
    pub fn new(config: ErrorResponseConfig) -> Self {
        Self { config }
    }

    /// Status and client-facing message for an error
    pub fn classify(&self, error: &GatewayError) -> (StatusCode, String) {
        let kind = error.kind();
        let status = kind.status_code();
        let message = match kind {
            ErrorKind::RouteNotFound => "Service not found".to_string(),
            ErrorKind::InvalidArgument | ErrorKind::UnhandledRuntime
                if self.config.expose_details =>
            {
                error.detail().unwrap_or_default().to_string()
            }
            ErrorKind::InvalidArgument | ErrorKind::UnhandledRuntime => reason_phrase(status),
            ErrorKind::Unrecognized => "Internal Server Error".to_string(),
        };
        (status, message)
    }

    pub fn envelope(&self, error: &GatewayError, path: &str) -> ErrorEnvelope {
        let (status, message) = self.classify(error);
        ErrorEnvelope {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            status: status.as_u16(),
            error: reason_phrase(status),
            message,
            path: path.to_string(),
        }
    }

    /// Render `error` for the request at `path`
    ///
    /// When `committed` is set nothing is written and the error comes back as is.
    pub fn respond(
        &self,
        error: GatewayError,
        path: &str,
        committed: bool,
    ) -> Result<Response, GatewayError> {
        if committed {
            return Err(error);
        }

        let envelope = self.envelope(&error, path);
        let status = StatusCode::from_u16(envelope.status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(path = %path, status = envelope.status, error = %error, "Gateway error");
        } else {
            warn!(path = %path, status = envelope.status, error = %error, "Gateway error");
        }
        metrics::record_error_response(status);

        Ok(json_response(status, &envelope))
    }
}

fn reason_phrase(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("Unknown Status")
        .to_string()
}

/// Axum middleware rendering parked [`GatewayError`]s into the envelope
pub async fn error_responder_middleware(
    State(responder): State<Arc<ErrorResponder>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let mut response = next.run(request).await;

    let Some(UnhandledFailure(failure)) = response.extensions_mut().remove::<UnhandledFailure>()
    else {
        return response;
    };

    let committed = response.extensions().get::<ResponseCommitted>().is_some();
    let error = Arc::try_unwrap(failure).unwrap_or_else(|shared| (*shared).clone());
    match responder.respond(error, &path, committed) {
        Ok(rendered) => rendered,
        Err(error) => {
            warn!(path = %path, error = %error, "Response already committed, leaving it untouched");
            response
                .extensions_mut()
                .insert(UnhandledFailure(Arc::new(error)));
            response
        }
    }
}

/// Response for a panicking handler, rendered later by the responder
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    error!(panic = %detail, "Handler panicked");
    axum::response::IntoResponse::into_response(GatewayError::internal(detail))
}
