//! # Upstream Forwarding
//!
//! Terminal stage of the gateway. A static, ordered table maps path patterns to
//! upstream base URLs; the first matching entry receives the request with its
//! path and query appended to the base URL. A path with no entry fails with
//! `RouteNotFound`.
//!
//! reqwest 0.11 is built on `http` 0.2 while axum uses `http` 1.x, so methods,
//! headers and statuses are converted through their byte representations.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Response,
};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::auth::policy::PathPattern;
use crate::core::config::RouteDefinition;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::IncomingRequest;
use crate::middleware::error_handling::ResponseCommitted;
use crate::middleware::pipeline::Downstream;

/// Headers that describe one connection and must not be relayed
const HOP_BY_HOP: [&str; 7] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.contains(&name)
}

/// One entry of the forwarding table
#[derive(Debug, Clone)]
pub struct UpstreamRoute {
    pub pattern: PathPattern,
    pub upstream: Url,
}

impl UpstreamRoute {
    pub fn new(pattern: &str, upstream: &str) -> GatewayResult<Self> {
        let upstream = Url::parse(upstream).map_err(|e| {
            GatewayError::config(format!("Invalid upstream URL '{}': {}", upstream, e))
        })?;
        Ok(Self {
            pattern: PathPattern::parse(pattern)?,
            upstream,
        })
    }

    /// Upstream URL for a request: base path, then request path and query
    pub fn target_url(&self, request: &IncomingRequest) -> Url {
        let mut url = self.upstream.clone();
        let base_path = self.upstream.path().trim_end_matches('/');
        url.set_path(&format!("{}{}", base_path, request.path()));
        url.set_query(request.query());
        url
    }
}

/// Forwards requests over HTTP with a shared client
#[derive(Debug, Clone)]
pub struct UpstreamForwarder {
    routes: Vec<UpstreamRoute>,
    client: reqwest::Client,
}

impl UpstreamForwarder {
    pub fn new(routes: Vec<UpstreamRoute>, timeout: Duration) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| GatewayError::internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { routes, client })
    }

    pub fn from_config(routes: &[RouteDefinition], timeout: Duration) -> GatewayResult<Self> {
        let routes = routes
            .iter()
            .map(|route| UpstreamRoute::new(&route.pattern, &route.upstream))
            .collect::<GatewayResult<Vec<_>>>()?;
        Self::new(routes, timeout)
    }

    /// First route whose pattern matches `path`
    pub fn match_route(&self, path: &str) -> Option<&UpstreamRoute> {
        self.routes.iter().find(|route| route.pattern.matches(path))
    }

    fn outbound_request(
        &self,
        route: &UpstreamRoute,
        request: IncomingRequest,
    ) -> GatewayResult<reqwest::RequestBuilder> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| GatewayError::invalid_argument(format!("Unsupported method: {}", e)))?;

        let mut builder = self.client.request(method, route.target_url(&request));
        for (name, value) in request.headers.iter() {
            if is_hop_by_hop(name.as_str()) || name == header::HOST {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_bytes());
        }
        Ok(builder.body(request.body))
    }
}

fn inbound_response(upstream: reqwest::Response) -> GatewayResult<Response> {
    let status = StatusCode::from_u16(upstream.status().as_u16()).map_err(|e| {
        GatewayError::runtime(format!("Upstream returned an invalid status: {}", e))
    })?;

    let mut headers = HeaderMap::with_capacity(upstream.headers().len());
    for (name, value) in upstream.headers().iter() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.append(name, value);
        }
    }

    // The body streams straight from the upstream, so the head is final
    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response.extensions_mut().insert(ResponseCommitted);
    Ok(response)
}

#[async_trait]
impl Downstream for UpstreamForwarder {
    #[instrument(skip(self, request), fields(request_id = %request.id))]
    async fn forward(&self, request: IncomingRequest) -> GatewayResult<Response> {
        let route = self
            .match_route(request.path())
            .ok_or_else(|| GatewayError::route_not_found(request.path()))?;

        debug!(
            pattern = %route.pattern,
            upstream = %route.upstream,
            "Forwarding request"
        );

        let upstream_response = self.outbound_request(route, request)?.send().await?;
        inbound_response(upstream_response)
    }
}
