use axum::http::{HeaderName, HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

use crate::core::config::CorsSettings;
use crate::core::error::{GatewayError, GatewayResult};

/// Build the CORS layer answering preflight requests
///
/// `"*"` for origins or headers mirrors the request instead of sending a literal
/// wildcard, because browsers refuse `*` together with credentials.
pub fn cors_layer(config: &CorsSettings) -> GatewayResult<CorsLayer> {
    let origins = if config.allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::mirror_request()
    } else {
        let origins = config
            .allowed_origins
            .iter()
            .map(|origin| {
                origin.parse::<HeaderValue>().map_err(|e| {
                    GatewayError::config(format!("Invalid CORS origin '{}': {}", origin, e))
                })
            })
            .collect::<GatewayResult<Vec<_>>>()?;
        AllowOrigin::list(origins)
    };

    let headers = if config.allowed_headers.iter().any(|h| h == "*") {
        AllowHeaders::mirror_request()
    } else {
        let headers = config
            .allowed_headers
            .iter()
            .map(|name| {
                name.parse::<HeaderName>().map_err(|e| {
                    GatewayError::config(format!("Invalid CORS header '{}': {}", name, e))
                })
            })
            .collect::<GatewayResult<Vec<_>>>()?;
        AllowHeaders::list(headers)
    };

    let methods = config
        .allowed_methods
        .iter()
        .map(|m| {
            m.parse::<Method>()
                .map_err(|e| GatewayError::config(format!("Invalid CORS method '{}': {}", m, e)))
        })
        .collect::<GatewayResult<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(config.allow_credentials)
        .max_age(Duration::from_secs(config.max_age_seconds)))
}
