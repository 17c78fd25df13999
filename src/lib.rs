//! # Edge Gateway - Core Library Crate
//!
//! An authenticating API gateway. It decides per path whether a request needs a
//! bearer token, validates the token, forwards the caller's identity to the
//! upstream service as headers, and turns every failure into a consistent JSON
//! error body.
//!
//! ## Request flow
//!
//! ```text
//! client -> CORS -> request logging -> authentication -> upstream forwarding
//!                      (error responder renders failures from any step)
//! ```
//!
//! ## Module layout
//! - `core`: configuration, error types and request types shared by every module
//! - `auth`: path policy, token validation and the authentication pipeline
//! - `middleware`: the stage chain plus CORS, logging and error rendering
//! - `routing`: the static forwarding table and the upstream HTTP client
//! - `gateway`: the axum server tying it together
//! - `observability`: tracing subscriber and Prometheus counters

/// Core functionality including error types, configuration, and basic data structures
pub mod core;

/// Main gateway server implementation and HTTP handling
pub mod gateway;

/// Stage chain and the transport-level layers around it
pub mod middleware;

/// Bearer-token authentication and path policy
pub mod auth;

/// Forwarding of requests to upstream services
pub mod routing;

/// Observability features: structured logging and metrics
pub mod observability;

// Re-export commonly used types so callers can write `edge_gateway::GatewayError`

/// Main error type used throughout the gateway
pub use core::error::{GatewayError, GatewayResult};

/// Main configuration structure for the gateway
pub use core::config::GatewayConfig;

pub use core::types::{EnrichedRequest, IncomingRequest};

pub use auth::{AuthenticationPipeline, AuthorizationPolicy, PathPolicy};

/// Server entry point
pub use gateway::server::GatewayServer;
