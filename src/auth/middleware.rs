//! # Authentication Stage
//!
//! Attaches the [`AuthenticationPipeline`] to the stage chain. The path policy is
//! consulted first, so whether a route is protected is decided in one visible
//! place instead of by which routes happen to carry a filter.

use async_trait::async_trait;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::debug;

use crate::auth::pipeline::AuthenticationPipeline;
use crate::auth::policy::{Access, AuthorizationPolicy};
use crate::core::error::GatewayResult;
use crate::core::types::IncomingRequest;
use crate::middleware::pipeline::{Next, Stage};

/// Stage that authenticates requests to protected paths
#[derive(Clone)]
pub struct AuthStage {
    policy: Arc<AuthorizationPolicy>,
    pipeline: Arc<AuthenticationPipeline>,
}

impl std::fmt::Debug for AuthStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthStage")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl AuthStage {
    pub fn new(policy: Arc<AuthorizationPolicy>, pipeline: Arc<AuthenticationPipeline>) -> Self {
        Self { policy, pipeline }
    }
}

#[async_trait]
impl Stage for AuthStage {
    fn name(&self) -> &str {
        "authentication"
    }

    async fn handle(&self, request: IncomingRequest, next: Next<'_>) -> GatewayResult<Response> {
        match self.policy.evaluate(&request) {
            Access::Preflight | Access::Public => {
                debug!(request_id = %request.id, path = %request.path(), "Authentication not required");
                next.run(request).await
            }
            Access::Protected => match self.pipeline.authenticate(request).await {
                Ok(enriched) => next.run(enriched.into_request()).await,
                Err(failure) => Ok(failure.into_response()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::policy::PathPolicy;
    use crate::auth::token::{ClaimExtractor, Claims, Credential, TokenValidator, TokenValidity};
    use crate::middleware::pipeline::{Downstream, StageChain};
    use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
    use bytes::Bytes;
    use chrono::Utc;

    struct AcceptAll;

    #[async_trait]
    impl TokenValidator for AcceptAll {
        async fn validate(&self, _credential: &Credential) -> GatewayResult<TokenValidity> {
            Ok(TokenValidity::Valid)
        }
    }

    impl ClaimExtractor for AcceptAll {
        fn extract_claims(&self, _credential: &Credential) -> GatewayResult<Claims> {
            Ok(Claims {
                username: Some("alice".to_string()),
                user_id: Some("42".to_string()),
                role: None,
                expiry: Utc::now(),
            })
        }
    }

    /// Answers 200 with the forwarded username, or "-" when absent
    struct WhoAmI;

    #[async_trait]
    impl Downstream for WhoAmI {
        async fn forward(&self, request: IncomingRequest) -> GatewayResult<Response> {
            let who = request.header("x-username").unwrap_or("-").to_string();
            Ok(who.into_response())
        }
    }

    fn chain() -> StageChain {
        let policy = AuthorizationPolicy::new(PathPolicy::Protected)
            .rule("/auth/**", PathPolicy::Public)
            .unwrap();
        let tokens = Arc::new(AcceptAll);
        let stage = AuthStage::new(
            Arc::new(policy),
            Arc::new(AuthenticationPipeline::new(tokens.clone(), tokens)),
        );
        StageChain::builder()
            .stage(Arc::new(stage))
            .build(Arc::new(WhoAmI))
    }

    fn request(method: Method, path: &'static str, headers: HeaderMap) -> IncomingRequest {
        IncomingRequest::new(method, Uri::from_static(path), headers, Bytes::new())
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_public_path_skips_pipeline() {
        let response = chain()
            .execute(request(Method::POST, "/auth/login", HeaderMap::new()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "-");
    }

    #[tokio::test]
    async fn test_protected_path_without_credential() {
        let response = chain()
            .execute(request(Method::GET, "/api/orders", HeaderMap::new()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_text(response).await,
            r#"{"error":"Missing authorization header","status":401}"#
        );
    }

    #[tokio::test]
    async fn test_protected_path_with_credential_is_enriched() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer token"));
        let response = chain()
            .execute(request(Method::GET, "/api/orders", headers))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "alice");
    }

    #[tokio::test]
    async fn test_preflight_skips_pipeline() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_static("https://shop.example"));
        headers.insert(
            header::ACCESS_CONTROL_REQUEST_METHOD,
            HeaderValue::from_static("POST"),
        );
        let response = chain()
            .execute(request(Method::OPTIONS, "/api/orders", headers))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
