//! # Error Handling Module
//!
//! Gateway-wide error type built on `thiserror`. Every failure that can escape the
//! stage chain is a [`GatewayError`]; the error responder turns it into the JSON
//! envelope returned to clients.
//!
//! ## Error Kinds
//!
//! Clients only ever see four kinds of failure, regardless of how many variants
//! this enum grows:
//! - [`ErrorKind::RouteNotFound`]: no upstream is configured for the path
//! - [`ErrorKind::InvalidArgument`]: the request itself is unacceptable
//! - [`ErrorKind::UnhandledRuntime`]: a runtime failure whose text may be shown
//! - [`ErrorKind::Unrecognized`]: anything else, always reported generically
//!
//! Credential problems are not represented here. They are handled entirely inside
//! the authentication pipeline (see `crate::auth::pipeline::AuthFailure`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::convert::Infallible;
use std::sync::Arc;
use thiserror::Error;

/// Main result type used throughout the gateway
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error types for the gateway
///
/// The `#[error("...")]` text is for logs only. What a client sees is decided by
/// [`GatewayError::kind`] and the error responder.
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    /// Configuration-related errors (invalid config, missing files, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// No forwarding rule matches the request path
    #[error("No route for path: {path}")]
    RouteNotFound { path: String },

    /// The request carries an argument the gateway cannot accept
    #[error("{message}")]
    InvalidArgument { message: String },

    /// Runtime failure raised while handling a request
    #[error("{message}")]
    Runtime { message: String },

    /// Upstream service could not be reached or answered with a broken response
    #[error("Upstream error ({upstream}): {message}")]
    Upstream { upstream: String, message: String },

    /// Credential validation fault inside a token validator
    #[error("Token error: {message}")]
    Token { message: String },

    /// Internal server errors for unexpected failures
    #[error("Internal server error: {message}")]
    Internal { message: String },

    /// I/O errors (file operations, socket binding, etc.)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },
}

/// Client-facing classification of a [`GatewayError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RouteNotFound,
    InvalidArgument,
    UnhandledRuntime,
    Unrecognized,
}

impl GatewayError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a route-not-found error for the given path
    pub fn route_not_found<S: Into<String>>(path: S) -> Self {
        Self::RouteNotFound { path: path.into() }
    }

    /// Create an invalid argument error with a custom message
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a runtime error with a custom message
    pub fn runtime<S: Into<String>>(message: S) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    /// Create an upstream error
    pub fn upstream<S: Into<String>, M: Into<String>>(upstream: S, message: M) -> Self {
        Self::Upstream {
            upstream: upstream.into(),
            message: message.into(),
        }
    }

    /// Create a token fault with a custom message
    pub fn token<S: Into<String>>(message: S) -> Self {
        Self::Token {
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classify this error for the client-facing response
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RouteNotFound { .. } => ErrorKind::RouteNotFound,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::Runtime { .. } => ErrorKind::UnhandledRuntime,
            Self::Configuration { .. }
            | Self::Upstream { .. }
            | Self::Token { .. }
            | Self::Internal { .. }
            | Self::Io { .. }
            | Self::Json { .. }
            | Self::Yaml { .. } => ErrorKind::Unrecognized,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        self.kind().status_code()
    }

    /// Detail text carried by errors whose message may be shown to clients
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::InvalidArgument { message } | Self::Runtime { message } => Some(message),
            _ => None,
        }
    }
}

impl ErrorKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            Self::RouteNotFound => StatusCode::NOT_FOUND,
            Self::InvalidArgument => StatusCode::BAD_REQUEST,
            Self::UnhandledRuntime | Self::Unrecognized => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Infallible> for GatewayError {
    fn from(infallible: Infallible) -> Self {
        match infallible {}
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for GatewayError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        let upstream = err
            .url()
            .map(|url| url.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Self::Upstream {
            upstream,
            message: err.to_string(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for GatewayError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Token {
            message: err.to_string(),
        }
    }
}

/// A failure that has not been rendered yet
///
/// Converting a [`GatewayError`] into a response does not produce the final body;
/// it parks the error in the response extensions so the error responder layer,
/// which knows the request path, can render the envelope.
#[derive(Debug, Clone)]
pub struct UnhandledFailure(pub Arc<GatewayError>);

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let mut response = self.status_code().into_response();
        response
            .extensions_mut()
            .insert(UnhandledFailure(Arc::new(self)));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            GatewayError::route_not_found("/x").kind(),
            ErrorKind::RouteNotFound
        );
        assert_eq!(
            GatewayError::invalid_argument("bad").kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            GatewayError::runtime("boom").kind(),
            ErrorKind::UnhandledRuntime
        );
        assert_eq!(
            GatewayError::upstream("http://svc", "refused").kind(),
            ErrorKind::Unrecognized
        );
        assert_eq!(GatewayError::config("nope").kind(), ErrorKind::Unrecognized);
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            GatewayError::route_not_found("/x").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::invalid_argument("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::runtime("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::internal("oops").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_detail_only_for_showable_kinds() {
        assert_eq!(GatewayError::runtime("boom").detail(), Some("boom"));
        assert_eq!(GatewayError::invalid_argument("bad").detail(), Some("bad"));
        assert_eq!(GatewayError::internal("secret").detail(), None);
        assert_eq!(GatewayError::token("key failure").detail(), None);
    }

    #[test]
    fn test_into_response_parks_error() {
        let response = GatewayError::runtime("boom").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let parked = response.extensions().get::<UnhandledFailure>().unwrap();
        assert_eq!(parked.0.to_string(), "boom");
    }
}
