//! Configuration data types for auto-tester.

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};

use crate::engine::{DEFAULT_APP_DIR, DEFAULT_TIMEOUT_SECS};
use crate::error::{ConfigError, Result};
use crate::registry::DEFAULT_LANGUAGES_FILE;
use crate::staging::DEFAULT_STAGING_ROOT;
use crate::synth::HypothesisStrategy;

/// Where the language mapping is read from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Path to the JSON language mapping file.
    pub path: Utf8PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: Utf8PathBuf::from(DEFAULT_LANGUAGES_FILE),
        }
    }
}

/// Per-run working directory settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Parent directory of the per-run working directories.
    pub root: Utf8PathBuf,

    /// Keep the working directory after the run instead of removing it.
    pub keep: bool,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            root: Utf8PathBuf::from(DEFAULT_STAGING_ROOT),
            keep: false,
        }
    }
}

/// Sandbox container settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Directory inside the sandbox the staged test is mounted into.
    pub app_dir: String,

    /// Wall-clock limit for one run, in seconds.
    pub timeout_secs: u64,

    /// Run the sandbox without a network.
    pub network_disabled: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            app_dir: String::from(DEFAULT_APP_DIR),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            network_disabled: true,
        }
    }
}

/// Test synthesis settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Hypothesis strategy used to render test blocks.
    pub strategy: HypothesisStrategy,
}

/// Root application configuration.
///
/// This structure is loaded from configuration files, environment variables,
/// and command-line arguments with layered precedence. The precedence order
/// (lowest to highest) is: defaults, configuration file, environment variables,
/// command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path given with `--config`
/// 2. Path specified via `AUTO_TESTER_CONFIG_PATH` environment variable
/// 3. `.auto-tester.toml` in the current working directory
/// 4. `.auto-tester.toml` in the home directory
/// 5. `~/.config/auto-tester/config.toml` (XDG default)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "AUTO_TESTER",
    post_merge_hook,
    discovery(
        app_name = "auto-tester",
        env_var = "AUTO_TESTER_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".auto-tester.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// The container engine socket path or URL.
    pub engine_socket: Option<String>,

    /// Language mapping configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub registry: RegistryConfig,

    /// Working directory configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub staging: StagingConfig,

    /// Sandbox configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub sandbox: SandboxConfig,

    /// Synthesis configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub synthesis: SynthesisConfig,
}

impl AppConfig {
    /// Check values that deserialise cleanly but cannot drive a run.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when the sandbox timeout is zero or
    /// the application directory is not an absolute path.
    pub fn validate(&self) -> Result<()> {
        if self.sandbox.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: String::from("sandbox.timeout_secs"),
                reason: String::from("must be greater than zero"),
            }
            .into());
        }
        if !self.sandbox.app_dir.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: String::from("sandbox.app_dir"),
                reason: format!("'{}' is not an absolute path", self.sandbox.app_dir),
            }
            .into());
        }
        Ok(())
    }
}

impl PostMergeHook for AppConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        self.engine_socket = self
            .engine_socket
            .take()
            .map(|socket| String::from(socket.trim()))
            .filter(|socket| !socket.is_empty());
        Ok(())
    }
}
