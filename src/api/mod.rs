//! Orchestration API for auto-tester.
//!
//! The pipeline functions here carry the business logic behind the CLI so it
//! is available to library embedders too. They accept library-owned types
//! (not clap types), return [`crate::error::Result`], and never print to
//! stdout/stderr or call `std::process::exit`.

mod pipeline;

pub use pipeline::{
    PipelineParams, PipelineReport, PipelineWithClientParams, PreparedRun, execute, prepare,
    run_pipeline, run_pipeline_with_client,
};

/// Outcome of a pipeline run.
///
/// The CLI adapter maps this onto a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The sandboxed command exited with status zero (exit code 0).
    Success,
    /// The sandboxed command exited non-zero, timed out, or was cancelled.
    SandboxFailed,
}
