//! Behavioural step helpers for pipeline scenarios.

mod assertions;
mod state;
mod steps;

pub use state::{PipelineState, pipeline_state};
