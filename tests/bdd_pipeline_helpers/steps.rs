//! Given/when step definitions for pipeline behavioural scenarios.

use std::future;
use std::sync::{Arc, Mutex};

use auto_tester::api::{PipelineReport, PipelineWithClientParams, run_pipeline_with_client};
use auto_tester::config::AppConfig;
use auto_tester::engine::{
    ContainerLogsFuture, CreateContainerFuture, EngineCallFuture, SandboxClient,
    WaitContainerFuture,
};
use auto_tester::error::{RegistryError, TesterError};
use bollard::container::LogOutput;
use bollard::models::{ContainerCreateBody, ContainerCreateResponse};
use bollard::query_parameters::{CreateContainerOptions, CreateImageOptions};
use camino::Utf8PathBuf;
use mockall::mock;
use rstest_bdd_macros::{given, when};

use super::state::{FailureKind, PipelineOutcome, PipelineState, RunRecord, StepResult};

mock! {
    #[derive(Debug)]
    Client {}

    impl SandboxClient for Client {
        fn create_container<'a>(
            &'a self,
            options: Option<CreateContainerOptions>,
            config: ContainerCreateBody,
        ) -> CreateContainerFuture<'a>;
        fn pull_image(&self, options: CreateImageOptions) -> EngineCallFuture<'_>;
        fn start_container(&self, container_id: &str) -> EngineCallFuture<'_>;
        fn wait_container(&self, container_id: &str) -> WaitContainerFuture<'_>;
        fn container_logs(&self, container_id: &str) -> ContainerLogsFuture<'_>;
        fn remove_container(&self, container_id: &str) -> EngineCallFuture<'_>;
    }
}

const LANGUAGES: &str = r#"{
    "python": { "docker_image": "python:3.11", "command": "pytest %s" },
    "javascript": { "docker_image": "node:20", "command": "node %s" }
}"#;

/// Encapsulates shared state for capturing mock client invocations.
struct MockCaptureState {
    call_count: Arc<Mutex<usize>>,
    command: Arc<Mutex<Option<String>>>,
}

impl MockCaptureState {
    fn new() -> Self {
        Self {
            call_count: Arc::new(Mutex::new(0_usize)),
            command: Arc::new(Mutex::new(None)),
        }
    }
}

#[given("a Python source file defining add")]
fn python_source_defining_add(pipeline_state: &PipelineState) -> StepResult<()> {
    write_source(pipeline_state, "add.py", "def add(x, y):\n    return x + y\n")
}

#[given("a JavaScript source file defining add")]
fn javascript_source_defining_add(pipeline_state: &PipelineState) -> StepResult<()> {
    write_source(
        pipeline_state,
        "add.js",
        "function add(a, b) {\n  return a + b;\n}\nmodule.exports = { add };\n",
    )
}

#[given("a Python source file with no functions")]
fn python_source_without_functions(pipeline_state: &PipelineState) -> StepResult<()> {
    write_source(pipeline_state, "constants.py", "ANSWER = 42\n")
}

#[given("the sandbox output is {output}")]
fn sandbox_output_is(pipeline_state: &PipelineState, output: String) {
    pipeline_state.sandbox_output.set(output);
}

#[given("the sandbox prints {passed} passing and {failed} failing markers")]
fn sandbox_prints_markers(pipeline_state: &PipelineState, passed: usize, failed: usize) {
    let mut output = String::new();
    for _ in 0..passed {
        output.push_str("Test Passed\n");
    }
    for _ in 0..failed {
        output.push_str("Test Failed\n");
    }
    pipeline_state.sandbox_output.set(output);
}

#[given("the sandbox exits with status {code}")]
fn sandbox_exits_with_status(pipeline_state: &PipelineState, code: i64) {
    pipeline_state.exit_code.set(code);
}

#[when("the pipeline runs for language {language}")]
fn pipeline_runs_for_language(pipeline_state: &PipelineState, language: String) -> StepResult<()> {
    let project = pipeline_state
        .project
        .get()
        .ok_or_else(|| String::from("a source file should be written first"))?;
    let source_path = pipeline_state
        .source_path
        .get()
        .ok_or_else(|| String::from("source path should be set"))?;
    let root = project_root(&project)?;

    let mut config = AppConfig::default();
    config.registry.path = root.join("languages.json");
    config.staging.root = root.join("staging");
    config.staging.keep = true;

    let capture_state = MockCaptureState::new();
    let client = setup_mock_client(pipeline_state, &capture_state);

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|_| String::from("failed to create tokio runtime for scenario"))?;
    let result = run_pipeline_with_client(PipelineWithClientParams {
        config: &config,
        language: &language,
        source_path: &source_path,
        runtime_handle: runtime.handle(),
        client: &client,
        cancel: future::pending(),
    });

    capture_mock_state(pipeline_state, &capture_state)?;

    match result {
        Ok(report) => {
            let record = record_report(&report)?;
            pipeline_state
                .outcome
                .set(PipelineOutcome::Completed(record));
        }
        Err(error) => record_failure(pipeline_state, &error),
    }

    Ok(())
}

fn write_source(pipeline_state: &PipelineState, name: &str, contents: &str) -> StepResult<()> {
    let project = ensure_project(pipeline_state)?;
    let path = project_root(&project)?.join(name);
    std::fs::write(&path, contents)
        .map_err(|error| format!("failed to write source {path}: {error}"))?;
    pipeline_state.source_path.set(path);
    Ok(())
}

fn ensure_project(pipeline_state: &PipelineState) -> StepResult<Arc<tempfile::TempDir>> {
    if let Some(project) = pipeline_state.project.get() {
        return Ok(project);
    }

    let project = Arc::new(
        tempfile::tempdir().map_err(|error| format!("failed to create tempdir: {error}"))?,
    );
    let mapping = project_root(&project)?.join("languages.json");
    std::fs::write(&mapping, LANGUAGES)
        .map_err(|error| format!("failed to write language mapping: {error}"))?;
    pipeline_state.project.set(Arc::clone(&project));
    Ok(project)
}

fn project_root(project: &tempfile::TempDir) -> StepResult<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(project.path().to_path_buf())
        .map_err(|_| String::from("temporary path should be valid UTF-8"))
}

fn setup_mock_client(
    pipeline_state: &PipelineState,
    capture_state: &MockCaptureState,
) -> MockClient {
    let output = pipeline_state.sandbox_output.get().unwrap_or_default();
    let code = pipeline_state.exit_code.get().unwrap_or(0);
    let call_count_for_closure = Arc::clone(&capture_state.call_count);
    let command_for_closure = Arc::clone(&capture_state.command);

    let mut client = MockClient::new();
    client
        .expect_create_container()
        .returning(move |_, config| {
            if let Ok(mut locked) = call_count_for_closure.lock() {
                *locked += 1;
            }
            if let Ok(mut locked) = command_for_closure.lock() {
                *locked = config.cmd.and_then(|cmd| cmd.last().cloned());
            }
            Box::pin(async {
                Ok(ContainerCreateResponse {
                    id: String::from("bdd-container-id"),
                    warnings: vec![],
                })
            })
        });
    client
        .expect_start_container()
        .returning(|_| Box::pin(async { Ok(()) }));
    client
        .expect_wait_container()
        .returning(move |_| Box::pin(async move { Ok(Some(code)) }));
    client.expect_container_logs().returning(move |_| {
        let frames = vec![LogOutput::StdOut {
            message: output.clone().into_bytes().into(),
        }];
        Box::pin(async move { Ok(frames) })
    });
    client
        .expect_remove_container()
        .returning(|_| Box::pin(async { Ok(()) }));
    client
}

fn capture_mock_state(
    pipeline_state: &PipelineState,
    capture_state: &MockCaptureState,
) -> StepResult<()> {
    let call_count_value = *capture_state
        .call_count
        .lock()
        .map_err(|_| String::from("engine call count mutex is poisoned"))?;
    let command_value = capture_state
        .command
        .lock()
        .map_err(|_| String::from("captured command mutex is poisoned"))?
        .clone();

    pipeline_state.engine_call_count.set(call_count_value);
    pipeline_state.sandbox_command.set(command_value);
    Ok(())
}

fn record_report(report: &PipelineReport) -> StepResult<RunRecord> {
    let staged_test_content = std::fs::read_to_string(report.staged_test.staged_path())
        .map_err(|error| format!("kept test should be readable: {error}"))?;

    Ok(RunRecord {
        succeeded: report.execution.succeeded(),
        staged_test_name: String::from(report.staged_test.file_name()),
        staged_test_content,
        counts: (
            report.summary.total,
            report.summary.passed,
            report.summary.failed,
        ),
    })
}

fn record_failure(pipeline_state: &PipelineState, error: &TesterError) {
    let kind = match error {
        TesterError::Registry(RegistryError::UnsupportedLanguage { .. }) => {
            FailureKind::UnsupportedLanguage
        }
        _ => FailureKind::Other,
    };
    pipeline_state.outcome.set(PipelineOutcome::Failed {
        kind,
        message: error.to_string(),
    });
}
