//! Application state shared across all request handlers.

use xrelay_core::processors::PipelineHandle;

/// Cloneable, cheap to pass around: the pipeline handle is an `Arc` inside.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: PipelineHandle,
}

impl AppState {
    pub fn new(pipeline: PipelineHandle) -> Self {
        Self { pipeline }
    }
}
