//! # Stage Chain
//!
//! Request processing as an explicit, ordered list of stages. Each stage receives
//! the request as it stands and a [`Next`] continuation; it may change the request
//! and call `next.run(..)`, or answer on its own and never call it. After the last
//! stage the request goes to the [`Downstream`].
//!
//! ## Rust Concepts Used
//! - `async_trait` for async trait methods on trait objects
//! - `Arc<dyn Trait>` so one chain can be shared by every connection
//! - Slices as the cursor into the remaining stages, so `Next` is cheap to create

use async_trait::async_trait;
use axum::response::Response;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::core::error::GatewayResult;
use crate::core::types::IncomingRequest;

/// A step in request processing
#[async_trait]
pub trait Stage: Send + Sync + fmt::Debug {
    /// Stage name for identification and logging
    fn name(&self) -> &str;

    /// Handle the request, optionally continuing with `next`
    async fn handle(&self, request: IncomingRequest, next: Next<'_>) -> GatewayResult<Response>;
}

/// Receives requests that made it through every stage
#[async_trait]
pub trait Downstream: Send + Sync {
    async fn forward(&self, request: IncomingRequest) -> GatewayResult<Response>;
}

/// Continuation handed to a stage
pub struct Next<'a> {
    remaining: &'a [Arc<dyn Stage>],
    downstream: &'a dyn Downstream,
}

impl<'a> Next<'a> {
    /// Run the rest of the chain
    pub async fn run(self, request: IncomingRequest) -> GatewayResult<Response> {
        match self.remaining.split_first() {
            Some((stage, rest)) => {
                debug!(request_id = %request.id, stage = stage.name(), "Entering stage");
                stage
                    .handle(
                        request,
                        Next {
                            remaining: rest,
                            downstream: self.downstream,
                        },
                    )
                    .await
            }
            None => self.downstream.forward(request).await,
        }
    }
}

/// Ordered stages in front of a downstream
#[derive(Clone)]
pub struct StageChain {
    stages: Vec<Arc<dyn Stage>>,
    downstream: Arc<dyn Downstream>,
}

impl fmt::Debug for StageChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageChain")
            .field("stages", &self.stage_names())
            .finish()
    }
}

impl StageChain {
    pub fn builder() -> StageChainBuilder {
        StageChainBuilder { stages: Vec::new() }
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Push a request through every stage and the downstream
    #[instrument(skip(self, request), fields(request_id = %request.id, path = %request.path()))]
    pub async fn execute(&self, request: IncomingRequest) -> GatewayResult<Response> {
        Next {
            remaining: &self.stages,
            downstream: self.downstream.as_ref(),
        }
        .run(request)
        .await
    }
}

/// Builds a [`StageChain`]; stages run in the order they are added
pub struct StageChainBuilder {
    stages: Vec<Arc<dyn Stage>>,
}

impl StageChainBuilder {
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn build(self, downstream: Arc<dyn Downstream>) -> StageChain {
        StageChain {
            stages: self.stages,
            downstream,
        }
    }
}
