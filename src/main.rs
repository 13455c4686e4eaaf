//! `auto-tester` application entry point.
//!
//! Synthesizes a test for one source file, runs it in a language-specific
//! container, and prints the captured output followed by a pass/fail summary.
//! It uses `eyre` for opaque error handling at the application boundary,
//! converting domain-specific errors into human-readable reports.
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/auto-tester/config.toml` or path from
//!    `AUTO_TESTER_CONFIG_PATH`)
//! 3. Environment variables (`AUTO_TESTER_*`)
//! 4. Command-line arguments
//!
//! Exit status is 0 only when the sandboxed command exited cleanly.

use std::future::Future;
use std::task::Poll;

use auto_tester::api::{CommandOutcome, PipelineParams, PipelineReport, run_pipeline};
use auto_tester::config::{AppConfig, Cli, is_informational, load_config};
use auto_tester::error::{ConfigError, Result as TesterResult, SandboxError};
use clap::Parser;
use eyre::{Report, Result as EyreResult};
use tracing_subscriber::EnvFilter;

/// Application entry point.
///
/// Uses `eyre::Result` as the return type so every failure, usage errors
/// included, ends the process with status 1 and a readable report.
fn main() -> EyreResult<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) if is_informational(&error) => error.exit(),
        Err(error) => return Err(Report::from(ConfigError::from(error))),
    };

    init_tracing(cli.verbose);

    // Load configuration with layered precedence: defaults < file < env < CLI.
    let config = load_config(&cli).map_err(Report::from)?;

    let report = run(&cli, &config).map_err(Report::from)?;
    print_report(&report);

    match report.outcome() {
        CommandOutcome::Success => Ok(()),
        CommandOutcome::SandboxFailed => {
            let (_, exit_error) = report.execution.into_parts();
            Err(exit_error.map_or_else(
                || Report::msg("sandboxed command failed"),
                Report::from,
            ))
        }
    }
}

/// Log to stderr, honouring `RUST_LOG` when it is set.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Execute the run, returning domain-specific errors.
///
/// Keeps semantic errors inside the run so the CLI boundary owns conversion
/// to `eyre::Report`.
fn run(cli: &Cli, config: &AppConfig) -> TesterResult<PipelineReport> {
    // `Handle::block_on` needs a worker thread to drive IO and timers.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .map_err(|error| SandboxError::RuntimeCreationFailed {
            message: error.to_string(),
        })?;
    let env = mockable::DefaultEnv::new();
    let cancel = arm_interrupt(runtime.handle());

    run_pipeline(PipelineParams {
        config,
        language: &cli.lang,
        source_path: &cli.file,
        runtime_handle: runtime.handle(),
        env: &env,
        cancel,
    })
}

/// Install the Ctrl+C handler and return a future that resolves on interrupt.
///
/// The handler is registered before this returns, so an interrupt at any
/// point of the run reaches the sandbox teardown. The future never resolves
/// if the handler cannot be installed.
fn arm_interrupt(runtime: &tokio::runtime::Handle) -> impl Future<Output = ()> + Send + 'static {
    let mut interrupt = Box::pin(tokio::signal::ctrl_c());
    let early = runtime.block_on(async { futures_util::poll!(interrupt.as_mut()) });

    async move {
        let installed = match early {
            Poll::Ready(result) => result,
            Poll::Pending => interrupt.await,
        };
        if installed.is_ok() {
            tracing::warn!("interrupt received; tearing down the sandbox");
        } else {
            std::future::pending::<()>().await;
        }
    }
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
fn print_report(report: &PipelineReport) {
    let output = report.execution.combined_output();
    print!("{output}");
    if !output.is_empty() && !output.ends_with('\n') {
        println!();
    }
    println!("{}", report.summary);
}
