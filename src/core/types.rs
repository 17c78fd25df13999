//! # Core Types Module
//!
//! Request types shared by every stage of the gateway. All of them are per-request
//! values: they are created when a request arrives, moved from stage to stage and
//! dropped once the response is produced.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Uri};
use bytes::Bytes;
use std::time::Instant;
use uuid::Uuid;

use crate::core::error::{GatewayError, GatewayResult};

/// Header carrying the authenticated user id to downstream services
pub static X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");

/// Header carrying the authenticated username to downstream services
pub static X_USERNAME: HeaderName = HeaderName::from_static("x-username");

/// Header carrying the authenticated user's role to downstream services
pub static X_USER_ROLE: HeaderName = HeaderName::from_static("x-user-role");

/// An inbound request as seen at the gateway boundary
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    /// Unique identifier for this request (for tracing and logging)
    pub id: String,

    /// HTTP method (GET, POST, etc.)
    pub method: Method,

    /// Request URI including path and query parameters
    pub uri: Uri,

    /// Request headers; names are case-insensitive and may repeat
    pub headers: HeaderMap,

    /// Request body
    pub body: Bytes,

    /// Timestamp when the request was received
    pub received_at: Instant,
}

impl IncomingRequest {
    /// Create a new incoming request with a generated ID
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            method,
            uri,
            headers,
            body,
            received_at: Instant::now(),
        }
    }

    /// Get the request path without query parameters
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Get query parameters as a string
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// First value of a header, if present and valid visible ASCII
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Whether this is a CORS preflight request
    pub fn is_preflight(&self) -> bool {
        self.method == Method::OPTIONS
            && self.headers.contains_key(header::ORIGIN)
            && self
                .headers
                .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
    }
}

/// Reject paths that a URL parser would rewrite before forwarding
///
/// Path policy and route matching work on the path as received. A `.` or `..`
/// segment (raw or percent-encoded, in any case mix) or a backslash would be
/// resolved by the upstream URL builder into a different path than the one the
/// policy approved, so such requests never enter the stage chain.
pub fn ensure_canonical_path(path: &str) -> GatewayResult<()> {
    let lowered = path.to_ascii_lowercase();
    if lowered.contains('\\') || lowered.contains("%5c") {
        return Err(GatewayError::invalid_argument(format!(
            "Path must not contain backslashes: {}",
            path
        )));
    }

    let has_dot_segment = lowered
        .split('/')
        .map(|segment| segment.replace("%2e", "."))
        .any(|segment| segment == "." || segment == "..");
    if has_dot_segment {
        return Err(GatewayError::invalid_argument(format!(
            "Path must not contain dot segments: {}",
            path
        )));
    }
    Ok(())
}

/// Identity values propagated to downstream services
///
/// Each field is the claim value, or the empty string when the claim was absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityHeaders {
    pub user_id: HeaderValue,
    pub username: HeaderValue,
    pub role: HeaderValue,
}

/// An incoming request plus the identity headers added by authentication
///
/// The original `Authorization` header is kept. Client-supplied values for the
/// identity headers are replaced so downstream services only see values derived
/// from a validated credential.
#[derive(Debug, Clone)]
pub struct EnrichedRequest {
    request: IncomingRequest,
}

impl EnrichedRequest {
    pub fn new(mut request: IncomingRequest, identity: IdentityHeaders) -> Self {
        request.headers.insert(X_USER_ID.clone(), identity.user_id);
        request.headers.insert(X_USERNAME.clone(), identity.username);
        request.headers.insert(X_USER_ROLE.clone(), identity.role);
        Self { request }
    }

    pub fn request(&self) -> &IncomingRequest {
        &self.request
    }

    pub fn into_request(self) -> IncomingRequest {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with(headers: HeaderMap) -> IncomingRequest {
        IncomingRequest::new(
            Method::GET,
            Uri::from_static("/api/orders?page=2"),
            headers,
            Bytes::new(),
        )
    }

    #[test]
    fn test_path_and_query() {
        let request = request_with(HeaderMap::new());
        assert_eq!(request.path(), "/api/orders");
        assert_eq!(request.query(), Some("page=2"));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Bearer abc"));
        let request = request_with(headers);
        assert_eq!(request.header("authorization"), Some("Bearer abc"));
        assert_eq!(request.header("AUTHORIZATION"), Some("Bearer abc"));
    }

    #[test]
    fn test_preflight_detection() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_static("https://app.example"));
        headers.insert(
            header::ACCESS_CONTROL_REQUEST_METHOD,
            HeaderValue::from_static("POST"),
        );
        let mut request = request_with(headers);
        assert!(!request.is_preflight());
        request.method = Method::OPTIONS;
        assert!(request.is_preflight());
        request.headers.remove(header::ORIGIN);
        assert!(!request.is_preflight());
    }

    #[test]
    fn test_canonical_paths_are_accepted() {
        for path in ["/", "/api/orders/1", "/api/products/v1.2", "/files/.hidden", "/a/...", "/a/%2e%2ex"] {
            assert!(ensure_canonical_path(path).is_ok(), "{}", path);
        }
    }

    #[test]
    fn test_dot_segments_are_rejected() {
        for path in [
            "/api/products/../orders/1",
            "/api/products/./x",
            "/api/products/..",
            "/api/products/%2e%2e/orders/1",
            "/api/products/%2E%2e/orders/1",
            "/api/products/.%2e/orders/1",
            "/api/products/%2e/orders",
            "/api/products\\..\\orders",
            "/api/products%5c..%5corders",
        ] {
            let result = ensure_canonical_path(path);
            assert!(
                matches!(result, Err(GatewayError::InvalidArgument { .. })),
                "{}",
                path
            );
        }
    }

    #[test]
    fn test_enrichment_replaces_spoofed_identity() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc"));
        headers.append("x-user-role", HeaderValue::from_static("ADMIN"));
        headers.append("x-user-role", HeaderValue::from_static("ROOT"));

        let enriched = EnrichedRequest::new(
            request_with(headers),
            IdentityHeaders {
                user_id: HeaderValue::from_static("42"),
                username: HeaderValue::from_static("alice"),
                role: HeaderValue::from_static(""),
            },
        );

        let headers = &enriched.request().headers;
        assert_eq!(headers.get_all("x-user-role").iter().count(), 1);
        assert_eq!(headers["x-user-role"], "");
        assert_eq!(headers["x-user-id"], "42");
        assert_eq!(headers["x-username"], "alice");
        assert_eq!(headers["authorization"], "Bearer abc");
    }
}
