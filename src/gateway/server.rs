//! # HTTP Server Module
//!
//! Binds the listener and wires the request flow together:
//!
//! ```text
//! TraceLayer -> CORS -> error responder -> panic catcher -> handler
//!                                                             |
//!                          request logging -> authentication -> upstream
//! ```
//!
//! The tower layers deal with transport concerns. Everything that decides what
//! happens to a request lives in the [`StageChain`] the handler runs.
//!
//! ## Rust Concepts Used
//!
//! - `Arc<T>` for sharing the stage chain across connections
//! - Axum's fallback handler so every path reaches the chain
//! - `with_graceful_shutdown` to drain in-flight requests on exit

use axum::{
    extract::{Request, State},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router as AxumRouter,
};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{debug, info};

use crate::auth::{AuthStage, AuthenticationPipeline, AuthorizationPolicy, JwtTokenValidator};
use crate::core::config::GatewayConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{ensure_canonical_path, IncomingRequest};
use crate::middleware::{
    cors_layer, error_responder_middleware, panic_response, ErrorResponder, RequestLoggingStage,
    StageChain,
};
use crate::routing::UpstreamForwarder;

/// Shared handler state
#[derive(Clone)]
struct GatewayState {
    chain: Arc<StageChain>,
    max_request_size: usize,
}

/// The gateway HTTP server
pub struct GatewayServer {
    config: GatewayConfig,
    app: AxumRouter,
}

impl std::fmt::Debug for GatewayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayServer")
            .field("bind_address", &self.config.server.bind_address)
            .field("http_port", &self.config.server.http_port)
            .finish()
    }
}

impl GatewayServer {
    /// Build the server with the JWT validator and upstream forwarder from `config`
    pub fn from_config(config: GatewayConfig) -> GatewayResult<Self> {
        config.validate()?;

        let validator = Arc::new(JwtTokenValidator::new(&config.auth.jwt)?);
        let pipeline = Arc::new(AuthenticationPipeline::new(validator.clone(), validator));
        let policy = Arc::new(AuthorizationPolicy::from_rules(
            &config.auth.policies,
            config.auth.default_policy,
        )?);
        let forwarder = Arc::new(UpstreamForwarder::from_config(
            &config.routes,
            config.server.upstream_timeout,
        )?);

        let chain = StageChain::builder()
            .stage(Arc::new(RequestLoggingStage::new()))
            .stage(Arc::new(AuthStage::new(policy, pipeline)))
            .build(forwarder);

        Self::with_chain(config, chain)
    }

    /// Build the server around an already assembled stage chain
    pub fn with_chain(config: GatewayConfig, chain: StageChain) -> GatewayResult<Self> {
        info!(stages = ?chain.stage_names(), "Assembled request stages");

        let state = GatewayState {
            chain: Arc::new(chain),
            max_request_size: config.server.max_request_size,
        };
        let responder = Arc::new(ErrorResponder::new(config.errors.clone()));

        let mut app = AxumRouter::new()
            .route("/health", get(health_check))
            .fallback(handle_request)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(middleware::from_fn_with_state(
                        responder,
                        error_responder_middleware,
                    ))
                    .layer(CatchPanicLayer::custom(panic_response)),
            );

        if config.cors.enabled {
            app = app.layer(cors_layer(&config.cors)?);
        }
        let app = app.layer(TraceLayer::new_for_http());

        Ok(Self { config, app })
    }

    /// The assembled router, for serving or in-process testing
    pub fn app(&self) -> AxumRouter {
        self.app.clone()
    }

    pub fn bind_addr(&self) -> GatewayResult<SocketAddr> {
        self.config.server.socket_addr()
    }

    /// Serve until the process is killed
    pub async fn start(self) -> GatewayResult<()> {
        self.start_with_shutdown(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests
    pub async fn start_with_shutdown<F>(self, shutdown: F) -> GatewayResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.bind_addr()?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            GatewayError::internal(format!("Failed to bind gateway server to {}: {}", addr, e))
        })?;

        info!("Gateway HTTP server listening on {}", addr);

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| GatewayError::internal(format!("Gateway server error: {}", e)))?;

        info!("Gateway HTTP server stopped");
        Ok(())
    }
}

/// Entry point for every path other than the local endpoints
async fn handle_request(
    State(state): State<GatewayState>,
    request: Request,
) -> Result<Response, GatewayError> {
    let (parts, body) = request.into_parts();
    ensure_canonical_path(parts.uri.path())?;

    let body = axum::body::to_bytes(body, state.max_request_size)
        .await
        .map_err(|e| GatewayError::invalid_argument(format!("Failed to read request body: {}", e)))?;

    let incoming = IncomingRequest::new(parts.method, parts.uri, parts.headers, body);
    debug!(
        request_id = %incoming.id,
        method = %incoming.method,
        path = %incoming.path(),
        "Processing incoming request"
    );

    state.chain.execute(incoming).await
}

/// Gateway liveness check
pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "UP" }))
}
