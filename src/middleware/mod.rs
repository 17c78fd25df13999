pub mod cors;
pub mod error_handling;
pub mod pipeline;
pub mod request_logging;

pub use cors::cors_layer;
pub use error_handling::{
    error_responder_middleware, json_response, panic_response, ErrorEnvelope, ErrorResponder,
    ResponseCommitted,
};
pub use pipeline::{Downstream, Next, Stage, StageChain, StageChainBuilder};
pub use request_logging::RequestLoggingStage;
