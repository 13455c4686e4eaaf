//! Then-step assertions for pipeline behavioural scenarios.

use rstest_bdd_macros::then;

use super::state::{FailureKind, PipelineOutcome, PipelineState, RunRecord, StepResult};

#[then("the run completes successfully")]
fn run_completes_successfully(pipeline_state: &PipelineState) -> StepResult<()> {
    let record = completed_run(pipeline_state)?;
    if record.succeeded {
        return Ok(());
    }
    Err(String::from("expected the sandboxed command to succeed"))
}

#[then("the run is reported as a sandbox failure")]
fn run_is_reported_as_sandbox_failure(pipeline_state: &PipelineState) -> StepResult<()> {
    let record = completed_run(pipeline_state)?;
    if record.succeeded {
        return Err(String::from("expected the sandboxed command to fail"));
    }
    Ok(())
}

#[then("the staged test is named {name}")]
fn staged_test_is_named(pipeline_state: &PipelineState, name: String) -> StepResult<()> {
    let record = completed_run(pipeline_state)?;
    if record.staged_test_name == name {
        return Ok(());
    }
    Err(format!(
        "expected staged test {name}, got {}",
        record.staged_test_name
    ))
}

#[then("the staged test asserts with {assertion}")]
fn staged_test_asserts_with(pipeline_state: &PipelineState, assertion: String) -> StepResult<()> {
    let record = completed_run(pipeline_state)?;
    if record.staged_test_content.contains(&assertion) {
        return Ok(());
    }
    Err(format!(
        "expected staged test to contain {assertion}, got:\n{}",
        record.staged_test_content
    ))
}

#[then("the staged test is empty")]
fn staged_test_is_empty(pipeline_state: &PipelineState) -> StepResult<()> {
    let record = completed_run(pipeline_state)?;
    if record.staged_test_content.is_empty() {
        return Ok(());
    }
    Err(format!(
        "expected an empty staged test, got:\n{}",
        record.staged_test_content
    ))
}

#[then("the sandbox command is {command}")]
fn sandbox_command_is(pipeline_state: &PipelineState, command: String) -> StepResult<()> {
    let captured = pipeline_state
        .sandbox_command
        .get()
        .flatten()
        .ok_or_else(|| String::from("no command was forwarded to the engine"))?;
    if captured == command {
        return Ok(());
    }
    Err(format!("expected command {command}, got {captured}"))
}

#[then("the summary reports {total} total, {passed} passed and {failed} failed")]
fn summary_reports(
    pipeline_state: &PipelineState,
    total: usize,
    passed: usize,
    failed: usize,
) -> StepResult<()> {
    let record = completed_run(pipeline_state)?;
    if record.counts == (total, passed, failed) {
        return Ok(());
    }
    Err(format!(
        "expected counts {:?}, got {:?}",
        (total, passed, failed),
        record.counts
    ))
}

#[then("the run fails because the language is unsupported")]
fn run_fails_because_language_unsupported(pipeline_state: &PipelineState) -> StepResult<()> {
    match outcome(pipeline_state)? {
        PipelineOutcome::Failed {
            kind: FailureKind::UnsupportedLanguage,
            ..
        } => Ok(()),
        PipelineOutcome::Failed { message, .. } => {
            Err(format!("expected unsupported language, got: {message}"))
        }
        PipelineOutcome::Completed(_) => Err(String::from("expected the run to fail")),
    }
}

#[then("the sandbox is not started")]
fn sandbox_is_not_started(pipeline_state: &PipelineState) -> StepResult<()> {
    let calls = pipeline_state.engine_call_count.get().unwrap_or(0);
    if calls == 0 {
        return Ok(());
    }
    Err(format!("expected no engine calls, got {calls}"))
}

fn outcome(pipeline_state: &PipelineState) -> StepResult<PipelineOutcome> {
    pipeline_state
        .outcome
        .get()
        .ok_or_else(|| String::from("pipeline outcome should be set"))
}

fn completed_run(pipeline_state: &PipelineState) -> StepResult<RunRecord> {
    match outcome(pipeline_state)? {
        PipelineOutcome::Completed(record) => Ok(record),
        PipelineOutcome::Failed { message, .. } => {
            Err(format!("expected a completed run, got failure: {message}"))
        }
    }
}
