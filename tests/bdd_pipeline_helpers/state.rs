//! Shared behavioural-test state for pipeline scenarios.

use std::sync::Arc;

use camino::Utf8PathBuf;
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;
use tempfile::TempDir;

/// Step result type for pipeline BDD tests.
pub type StepResult<T> = Result<T, String>;

/// What a completed run left behind.
#[derive(Clone)]
pub struct RunRecord {
    /// Whether the sandboxed command exited cleanly.
    pub succeeded: bool,
    /// File name of the staged test.
    pub staged_test_name: String,
    /// Contents of the staged test.
    pub staged_test_content: String,
    /// Summary counts as `(total, passed, failed)`.
    pub counts: (usize, usize, usize),
}

/// High-level outcome observed after a pipeline run.
#[derive(Clone)]
pub enum PipelineOutcome {
    /// The pipeline produced a report.
    Completed(RunRecord),

    /// The pipeline stopped with an error.
    Failed {
        /// The failure category.
        kind: FailureKind,
        /// Human-readable error message.
        message: String,
    },
}

/// Categorized failure outcomes for assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The language has no execution profile.
    UnsupportedLanguage,
    /// Any other failure kind.
    Other,
}

/// Shared scenario state for pipeline behavioural tests.
#[derive(Default, ScenarioState)]
pub struct PipelineState {
    /// Temporary directory holding the mapping, sources, and staging root.
    pub(crate) project: Slot<Arc<TempDir>>,

    /// Source file handed to the pipeline.
    pub(crate) source_path: Slot<Utf8PathBuf>,

    /// Output the mocked sandbox reports.
    pub(crate) sandbox_output: Slot<String>,

    /// Exit status the mocked sandbox reports.
    pub(crate) exit_code: Slot<i64>,

    /// Shell command forwarded to the engine, if a container was created.
    pub(crate) sandbox_command: Slot<Option<String>>,

    /// Number of times the mocked engine create operation was invoked.
    pub(crate) engine_call_count: Slot<usize>,

    /// Outcome of the most recent run.
    pub(crate) outcome: Slot<PipelineOutcome>,
}

/// Fixture providing fresh state for each pipeline scenario.
#[fixture]
pub fn pipeline_state() -> PipelineState {
    let state = PipelineState::default();
    state.sandbox_output.set(String::new());
    state.exit_code.set(0);
    state.sandbox_command.set(None);
    state.engine_call_count.set(0);
    state
}
