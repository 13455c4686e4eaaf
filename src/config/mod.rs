//! Configuration system for auto-tester.
//!
//! This module provides the configuration structures and CLI definitions for
//! the auto-tester application. Precedence (lowest to highest): defaults,
//! configuration file, environment variables, command-line flags.
//!
//! The configuration file is expected at `~/.config/auto-tester/config.toml`
//! by default.
//!
//! # Example Configuration
//!
//! ```toml
//! engine_socket = "unix:///run/user/1000/podman/podman.sock"
//!
//! [registry]
//! path = "/etc/auto-tester/languages.json"
//!
//! [staging]
//! root = "/tmp/auto-tester-cli"
//! keep = false
//!
//! [sandbox]
//! app_dir = "/app"
//! timeout_secs = 300
//! network_disabled = true
//!
//! [synthesis]
//! strategy = "addition"
//! ```

mod cli;
mod loader;
mod types;


pub use cli::{Cli, is_informational};
pub use loader::{env_var_names, load_config, load_config_with_env};
pub use types::{AppConfig, RegistryConfig, SandboxConfig, StagingConfig, SynthesisConfig};
