//! Command-line argument definitions for auto-tester.

use camino::Utf8PathBuf;
use clap::Parser;
use clap::error::ErrorKind;

use crate::synth::HypothesisStrategy;

/// Command-line interface for auto-tester.
#[derive(Debug, Clone, Parser)]
#[command(name = "auto-tester")]
#[command(
    author,
    version,
    about = "Synthesize tests for a source file and run them in a container sandbox",
    long_about = "Synthesize tests for a source file and run them in a container sandbox.\n\n\
        The sandbox runs without network access unless --allow-network is given \
        or sandbox.network_disabled is set to false, so test commands that \
        download packages need one of those."
)]
pub struct Cli {
    /// Language identifier used to pick the execution profile.
    #[arg(short = 'l', long = "lang", required = true)]
    pub lang: String,

    /// Source file to test.
    #[arg(short = 'f', long = "file", required = true)]
    pub file: Utf8PathBuf,

    /// Path to configuration file.
    #[arg(long)]
    pub config: Option<Utf8PathBuf>,

    /// Container engine socket path or URL.
    #[arg(long)]
    pub engine_socket: Option<String>,

    /// Path to the JSON language mapping.
    #[arg(long)]
    pub languages: Option<Utf8PathBuf>,

    /// Hypothesis strategy for generated tests.
    #[arg(long, value_enum)]
    pub strategy: Option<HypothesisStrategy>,

    /// Sandbox time limit in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Give the sandbox network access.
    #[arg(long)]
    pub allow_network: bool,

    /// Keep the per-run working directory after the run.
    #[arg(long)]
    pub keep_workdir: bool,

    /// Log at debug level.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Return `true` when `error` is a help or version request rather than a
/// usage mistake.
#[must_use]
pub fn is_informational(error: &clap::Error) -> bool {
    matches!(
        error.kind(),
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
    )
}
