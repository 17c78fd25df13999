//! # Authentication Pipeline
//!
//! Turns an [`IncomingRequest`] into an [`EnrichedRequest`] or a local 401.
//!
//! The steps run in a fixed order and stop at the first failure:
//!
//! ```text
//! header present -> Bearer scheme -> validate -> read claims -> add identity headers
//! ```
//!
//! Credential failures never leave this module as errors. They are rendered as an
//! [`AuthErrorBody`], which is deliberately narrower than the gateway-wide error
//! envelope.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::FutureExt;
use serde::Serialize;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::token::{ClaimExtractor, Claims, Credential, TokenValidator, TokenValidity};
use crate::core::error::GatewayResult;
use crate::core::types::{EnrichedRequest, IdentityHeaders, IncomingRequest};
use crate::middleware::error_handling::json_response;
use crate::observability::metrics;

/// Literal scheme prefix, case-sensitive, single space
pub const BEARER_PREFIX: &str = "Bearer ";

/// Why the pipeline refused a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    MissingCredential,
    MalformedCredential,
    InvalidOrExpiredCredential,
    /// A fault inside validation or extraction; details go to the log only
    AuthenticationInternalFailure,
}

impl AuthFailure {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    /// Client-facing message
    pub fn message(&self) -> &'static str {
        match self {
            Self::MissingCredential => "Missing authorization header",
            Self::MalformedCredential => "Invalid authorization header format",
            Self::InvalidOrExpiredCredential => "Invalid or expired token",
            Self::AuthenticationInternalFailure => "Authentication failed",
        }
    }

    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::MalformedCredential => "malformed_credential",
            Self::InvalidOrExpiredCredential => "invalid_or_expired_credential",
            Self::AuthenticationInternalFailure => "authentication_internal_failure",
        }
    }

    pub fn body(&self) -> AuthErrorBody {
        AuthErrorBody {
            error: self.message().to_string(),
            status: self.status_code().as_u16(),
        }
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for AuthFailure {}

/// Pipeline-local error body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthErrorBody {
    pub error: String,
    pub status: u16,
}

impl IntoResponse for AuthFailure {
    fn into_response(self) -> Response {
        json_response(self.status_code(), &self.body())
    }
}

/// Bearer-token authentication for one request at a time
///
/// Holds only shared, read-only capabilities, so a single instance serves all
/// concurrent requests.
#[derive(Clone)]
pub struct AuthenticationPipeline {
    validator: Arc<dyn TokenValidator>,
    extractor: Arc<dyn ClaimExtractor>,
}

impl AuthenticationPipeline {
    pub fn new(validator: Arc<dyn TokenValidator>, extractor: Arc<dyn ClaimExtractor>) -> Self {
        Self {
            validator,
            extractor,
        }
    }

    /// Run every check and enrich the request, or report the first failure
    ///
    /// Emits one log record per call, whatever the outcome.
    pub async fn authenticate(
        &self,
        request: IncomingRequest,
    ) -> Result<EnrichedRequest, AuthFailure> {
        let request_id = request.id.clone();
        match self.run(request).await {
            Ok((enriched, username)) => {
                info!(request_id = %request_id, username = %username, "Authentication successful");
                metrics::record_auth_outcome("success");
                Ok(enriched)
            }
            Err(refusal) => {
                warn!(
                    request_id = %request_id,
                    reason = refusal.failure.as_str(),
                    detail = refusal.detail.as_deref().unwrap_or(""),
                    "Authentication failed: {}",
                    refusal.failure
                );
                metrics::record_auth_outcome(refusal.failure.as_str());
                Err(refusal.failure)
            }
        }
    }

    async fn run(&self, request: IncomingRequest) -> Result<(EnrichedRequest, String), Refusal> {
        let header_value = request
            .headers
            .get(header::AUTHORIZATION)
            .ok_or(Refusal::bare(AuthFailure::MissingCredential))?;

        // Everything after the prefix is the credential, even if empty
        let credential = header_value
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix(BEARER_PREFIX))
            .map(Credential::new)
            .ok_or(Refusal::bare(AuthFailure::MalformedCredential))?;

        let validity = AssertUnwindSafe(self.validator.validate(&credential))
            .catch_unwind()
            .await;
        match validity {
            Ok(Ok(TokenValidity::Valid)) => {}
            Ok(Ok(TokenValidity::Rejected(reason))) => {
                return Err(Refusal::new(
                    AuthFailure::InvalidOrExpiredCredential,
                    format!("credential rejected: {}", reason),
                ));
            }
            Ok(Err(fault)) => {
                return Err(Refusal::internal(format!("token validator fault: {}", fault)));
            }
            Err(_) => return Err(Refusal::internal("token validator panicked")),
        }

        // One decode yields all three identity fields
        let claims = extract_claims(|| self.extractor.extract_claims(&credential))?;

        let identity = IdentityHeaders {
            user_id: header_text("user_id", claims.user_id.as_deref())?,
            username: header_text("username", claims.username.as_deref())?,
            role: header_text("role", claims.role.as_deref())?,
        };

        Ok((
            EnrichedRequest::new(request, identity),
            claims.username.unwrap_or_default(),
        ))
    }
}

/// A failure plus the detail that goes to the log and nowhere else
struct Refusal {
    failure: AuthFailure,
    detail: Option<String>,
}

impl Refusal {
    fn bare(failure: AuthFailure) -> Self {
        Self {
            failure,
            detail: None,
        }
    }

    fn new<S: Into<String>>(failure: AuthFailure, detail: S) -> Self {
        Self {
            failure,
            detail: Some(detail.into()),
        }
    }

    fn internal<S: Into<String>>(detail: S) -> Self {
        Self::new(AuthFailure::AuthenticationInternalFailure, detail)
    }
}

fn extract_claims<F>(f: F) -> Result<Claims, Refusal>
where
    F: FnOnce() -> GatewayResult<Claims>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(claims)) => Ok(claims),
        Ok(Err(fault)) => Err(Refusal::internal(format!("claim extraction failed: {}", fault))),
        Err(_) => Err(Refusal::internal("claim extraction panicked")),
    }
}

/// A missing claim becomes an empty header value.
fn header_text(claim: &str, value: Option<&str>) -> Result<HeaderValue, Refusal> {
    HeaderValue::from_str(value.unwrap_or("")).map_err(|e| {
        Refusal::internal(format!("{} cannot be carried in a header: {}", claim, e))
    })
}
