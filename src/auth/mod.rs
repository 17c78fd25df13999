//! # Authentication
//!
//! Bearer-credential authentication at the gateway boundary:
//! - [`policy`]: which paths need a credential
//! - [`token`]: credential validation and claim extraction
//! - [`pipeline`]: the per-request check-and-enrich sequence
//! - [`middleware`]: the stage that attaches the pipeline to the request flow

pub mod middleware;
pub mod pipeline;
pub mod policy;
pub mod token;

pub use middleware::AuthStage;
pub use pipeline::{AuthErrorBody, AuthFailure, AuthenticationPipeline};
pub use policy::{Access, AuthorizationPolicy, PathPattern, PathPolicy};
pub use token::{
    ClaimExtractor, Claims, Credential, JwtTokenValidator, RejectionReason, TokenValidator,
    TokenValidity,
};
