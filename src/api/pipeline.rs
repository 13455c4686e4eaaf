//! End-to-end test pipeline orchestration.
//!
//! A run is split into two phases. [`prepare`] does the local work: resolve
//! the language profile, read and synthesize the source, and stage both files
//! in a fresh working directory. [`execute`] runs the staged test in the
//! sandbox, analyzes the output, and disposes of the working directory.

use std::future::Future;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use uuid::Uuid;

use crate::analysis::{ResultSummary, analyze};
use crate::config::AppConfig;
use crate::engine::{
    EngineConnector, ExecutionOutcome, SandboxClient, SandboxRequest, SocketResolver,
};
use crate::error::Result as TesterResult;
use crate::registry::{ExecutionProfile, LanguageRegistry};
use crate::staging::{StagedFile, Workspace};
use crate::synth::{Dialect, SourceUnit, SynthesizedTest, Synthesizer};

use super::CommandOutcome;

const CONTAINER_NAME_PREFIX: &str = "auto-tester-";

/// Parameters for a full pipeline run against the configured engine.
pub struct PipelineParams<'a, E: mockable::Env, F> {
    /// Merged application configuration.
    pub config: &'a AppConfig,
    /// Language identifier selecting the execution profile.
    pub language: &'a str,
    /// Source file to test.
    pub source_path: &'a Utf8Path,
    /// Tokio runtime handle for blocking execution.
    pub runtime_handle: &'a tokio::runtime::Handle,
    /// Environment variable provider for socket resolution.
    pub env: &'a E,
    /// Resolves when the operator asks to abandon the run.
    pub cancel: F,
}

/// Parameters for a pipeline run against a caller-supplied engine client.
pub struct PipelineWithClientParams<'a, C, F> {
    /// Merged application configuration.
    pub config: &'a AppConfig,
    /// Language identifier selecting the execution profile.
    pub language: &'a str,
    /// Source file to test.
    pub source_path: &'a Utf8Path,
    /// Tokio runtime handle for blocking execution.
    pub runtime_handle: &'a tokio::runtime::Handle,
    /// Engine client used for the sandbox.
    pub client: &'a C,
    /// Resolves when the operator asks to abandon the run.
    pub cancel: F,
}

/// A run whose files are staged and ready for the sandbox.
#[derive(Debug)]
pub struct PreparedRun {
    profile: ExecutionProfile,
    test: SynthesizedTest,
    workspace: Workspace,
    staged_source: StagedFile,
    staged_test: StagedFile,
    keep_workdir: bool,
}

impl PreparedRun {
    /// Return the resolved execution profile.
    #[must_use]
    pub const fn profile(&self) -> &ExecutionProfile {
        &self.profile
    }

    /// Return the synthesized test.
    #[must_use]
    pub const fn test(&self) -> &SynthesizedTest {
        &self.test
    }

    /// Return the run identifier.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.workspace.run_id()
    }

    /// Return the working directory path.
    #[must_use]
    pub fn workdir(&self) -> &Utf8Path {
        self.workspace.path()
    }

    /// Return the staged copy of the source.
    #[must_use]
    pub const fn staged_source(&self) -> &StagedFile {
        &self.staged_source
    }

    /// Return the staged test file.
    #[must_use]
    pub const fn staged_test(&self) -> &StagedFile {
        &self.staged_test
    }

    /// Return the command the sandbox will run.
    #[must_use]
    pub fn command(&self) -> String {
        self.profile.fill_command(self.staged_test.file_name())
    }

    /// Drop the run without executing it, removing the working directory
    /// unless it is being kept.
    pub fn discard(self) {
        dispose_workspace(self.workspace, self.keep_workdir);
    }
}

/// Everything a completed run produced.
#[derive(Debug)]
pub struct PipelineReport {
    /// The execution profile the language resolved to.
    pub profile: ExecutionProfile,
    /// Identifier of the run and its working directory.
    pub run_id: Uuid,
    /// Working directory path; it only still exists when kept.
    pub workdir: Utf8PathBuf,
    /// The verbatim copy of the source.
    pub staged_source: StagedFile,
    /// The synthesized test file.
    pub staged_test: StagedFile,
    /// Captured output and exit status of the sandbox.
    pub execution: ExecutionOutcome,
    /// Pass/fail counts derived from the output.
    pub summary: ResultSummary,
}

impl PipelineReport {
    /// Map the sandbox result onto a command outcome.
    #[must_use]
    pub const fn outcome(&self) -> CommandOutcome {
        if self.execution.succeeded() {
            CommandOutcome::Success
        } else {
            CommandOutcome::SandboxFailed
        }
    }
}

/// Resolve, synthesize, and stage a run.
///
/// # Errors
///
/// Returns `RegistryError` when the mapping cannot be loaded or the language
/// is unsupported, and `FilesystemError` when the source cannot be read or the
/// working directory cannot be written.
pub fn prepare(
    config: &AppConfig,
    language: &str,
    source_path: &Utf8Path,
) -> TesterResult<PreparedRun> {
    let registry = LanguageRegistry::load(&config.registry.path)?;
    let profile = registry.resolve(language)?.clone();
    tracing::info!(language, image = profile.image(), "resolved execution profile");

    let source = SourceUnit::read(source_path)?;
    let dialect = Dialect::select(profile.dialect(), profile.language_id());
    let test = Synthesizer::new(dialect, config.synthesis.strategy).synthesize(&source);
    tracing::info!(
        source = %source_path,
        blocks = test.block_count(),
        "synthesized tests"
    );
    if test.is_empty() {
        tracing::warn!(source = %source_path, "no declarations found; the staged test is empty");
    }

    let workspace = Workspace::allocate(&config.staging.root)?;
    let staged = workspace
        .stage_source(&source)
        .and_then(|staged_source| {
            workspace
                .stage_test(&source, &test)
                .map(|staged_test| (staged_source, staged_test))
        });
    let (staged_source, staged_test) = match staged {
        Ok(files) => files,
        Err(error) => {
            dispose_workspace(workspace, config.staging.keep);
            return Err(error.into());
        }
    };
    tracing::info!(workdir = %workspace.path(), "staged source and test");

    Ok(PreparedRun {
        profile,
        test,
        workspace,
        staged_source,
        staged_test,
        keep_workdir: config.staging.keep,
    })
}

/// Run a prepared run in the sandbox and analyze its output.
///
/// The working directory is removed afterwards on every path unless
/// `staging.keep` is set. The analyzer runs on the captured output whatever
/// the exit status.
///
/// # Errors
///
/// Returns `ConfigError` when the sandbox request is invalid and
/// `SandboxError` when the container cannot be created, started, waited on,
/// or read.
pub fn execute<C, F>(
    config: &AppConfig,
    prepared: PreparedRun,
    runtime_handle: &tokio::runtime::Handle,
    client: &C,
    cancel: F,
) -> TesterResult<PipelineReport>
where
    C: SandboxClient + Sync,
    F: Future<Output = ()> + Send,
{
    let PreparedRun {
        profile,
        test: _,
        workspace,
        staged_source,
        staged_test,
        keep_workdir,
    } = prepared;
    let run_id = workspace.run_id();
    let workdir = workspace.path().to_path_buf();

    let run_result =
        sandbox_request(config, &profile, &staged_test, run_id).and_then(|request| {
            tracing::info!(command = request.command(), "running sandbox");
            EngineConnector::run_sandbox(runtime_handle, client, &request, cancel)
        });
    dispose_workspace(workspace, keep_workdir);
    let execution = run_result?;

    let summary = analyze(execution.combined_output());
    tracing::info!(
        total = summary.total,
        passed = summary.passed,
        failed = summary.failed,
        "analyzed output"
    );

    Ok(PipelineReport {
        profile,
        run_id,
        workdir,
        staged_source,
        staged_test,
        execution,
        summary,
    })
}

/// Run the whole pipeline against the configured container engine.
///
/// The engine is health-checked after staging, so language and file problems
/// are reported before engine problems.
///
/// # Errors
///
/// Returns the errors of [`prepare`] and [`execute`], plus `SandboxError`
/// connection failures when the engine is unreachable.
pub fn run_pipeline<E, F>(params: PipelineParams<'_, E, F>) -> TesterResult<PipelineReport>
where
    E: mockable::Env,
    F: Future<Output = ()> + Send,
{
    let PipelineParams {
        config,
        language,
        source_path,
        runtime_handle,
        env,
        cancel,
    } = params;

    let prepared = prepare(config, language, source_path)?;

    let resolver = SocketResolver::new(env);
    let docker = match EngineConnector::connect_with_fallback_and_verify(
        runtime_handle,
        config.engine_socket.as_deref(),
        &resolver,
    ) {
        Ok(docker) => docker,
        Err(error) => {
            prepared.discard();
            return Err(error);
        }
    };

    execute(config, prepared, runtime_handle, &docker, cancel)
}

/// Run the whole pipeline against a caller-supplied engine client.
///
/// # Errors
///
/// Returns the errors of [`prepare`] and [`execute`].
pub fn run_pipeline_with_client<C, F>(
    params: PipelineWithClientParams<'_, C, F>,
) -> TesterResult<PipelineReport>
where
    C: SandboxClient + Sync,
    F: Future<Output = ()> + Send,
{
    let PipelineWithClientParams {
        config,
        language,
        source_path,
        runtime_handle,
        client,
        cancel,
    } = params;

    let prepared = prepare(config, language, source_path)?;
    execute(config, prepared, runtime_handle, client, cancel)
}

fn sandbox_request(
    config: &AppConfig,
    profile: &ExecutionProfile,
    staged_test: &StagedFile,
    run_id: Uuid,
) -> TesterResult<SandboxRequest> {
    Ok(SandboxRequest::new(
        profile.image(),
        profile.fill_command(staged_test.file_name()),
        staged_test.staged_path(),
    )?
    .with_app_dir(config.sandbox.app_dir.as_str())
    .with_timeout(Duration::from_secs(config.sandbox.timeout_secs))
    .with_network_disabled(config.sandbox.network_disabled)
    .with_name(Some(format!("{CONTAINER_NAME_PREFIX}{run_id}"))))
}

fn dispose_workspace(workspace: Workspace, keep: bool) {
    if keep {
        tracing::info!(workdir = %workspace.path(), "keeping working directory");
        return;
    }
    if let Err(error) = workspace.remove() {
        tracing::warn!(error = %error, "failed to remove working directory");
    }
}
