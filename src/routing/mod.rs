//! Forwarding of authenticated requests to upstream services

pub mod upstream;

pub use upstream::{UpstreamForwarder, UpstreamRoute};
