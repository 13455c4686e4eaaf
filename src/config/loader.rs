//! Configuration loading with layered precedence.
//!
//! Layers are composed manually with `MergeComposer` (lowest to highest):
//! application defaults, configuration file, environment variables,
//! command-line arguments. The CLI owns `--lang` and `--file`, which are
//! run inputs rather than configuration, so `OrthoConfig::load()` cannot parse
//! it directly.
//!
//! # Environment Variable Handling
//!
//! Environment variables with unparseable values (e.g.,
//! `AUTO_TESTER_STAGING_KEEP=maybe` instead of `true`/`false`) return an error
//! immediately rather than silently falling back to defaults. String fields
//! such as `AUTO_TESTER_ENGINE_SOCKET` are always accepted.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use clap::ValueEnum;
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use crate::config::{AppConfig, Cli};
use crate::error::{ConfigError, Result};
use crate::synth::HypothesisStrategy;

/// The type of value expected from an environment variable.
#[derive(Clone, Copy)]
enum EnvVarType {
    /// String value (always accepted).
    String,
    /// Boolean value (`true`/`false`).
    Bool,
    /// Unsigned 64-bit integer.
    U64,
    /// One of the hypothesis strategy names.
    Strategy,
}

/// Specification for a single environment variable mapping.
struct EnvVarSpec {
    /// The environment variable name.
    env_var: &'static str,
    /// The JSON path segments (e.g., `["sandbox", "timeout_secs"]`).
    path: &'static [&'static str],
    /// The expected value type.
    var_type: EnvVarType,
}

const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    EnvVarSpec {
        env_var: "AUTO_TESTER_ENGINE_SOCKET",
        path: &["engine_socket"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "AUTO_TESTER_REGISTRY_PATH",
        path: &["registry", "path"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "AUTO_TESTER_STAGING_ROOT",
        path: &["staging", "root"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "AUTO_TESTER_STAGING_KEEP",
        path: &["staging", "keep"],
        var_type: EnvVarType::Bool,
    },
    EnvVarSpec {
        env_var: "AUTO_TESTER_SANDBOX_APP_DIR",
        path: &["sandbox", "app_dir"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "AUTO_TESTER_SANDBOX_TIMEOUT_SECS",
        path: &["sandbox", "timeout_secs"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "AUTO_TESTER_SANDBOX_NETWORK_DISABLED",
        path: &["sandbox", "network_disabled"],
        var_type: EnvVarType::Bool,
    },
    EnvVarSpec {
        env_var: "AUTO_TESTER_SYNTHESIS_STRATEGY",
        path: &["synthesis", "strategy"],
        var_type: EnvVarType::Strategy,
    },
];

/// Returns the list of environment variable names recognised by the config
/// loader, so tests can clear all of them.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|spec| spec.env_var).collect()
}

/// Load a configuration file and push it to the composer.
fn load_config_file(path: &Utf8Path, composer: &mut MergeComposer) -> Result<()> {
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|e| {
        ConfigError::ParseError {
            message: format!("failed to open directory {parent}: {e}"),
        }
    })?;

    let content = dir
        .read_to_string(file_name)
        .map_err(|e| ConfigError::ParseError {
            message: format!("failed to read {path}: {e}"),
        })?;

    let value =
        toml::from_str::<serde_json::Value>(&content).map_err(|e| ConfigError::ParseError {
            message: format!("failed to parse {path}: {e}"),
        })?;

    tracing::debug!(path = %path, "loaded configuration file");
    composer.push_file(value, Some(path.to_path_buf()));
    Ok(())
}

/// Find the configuration file: an explicit `--config` path, or the first
/// existing discovery candidate.
fn config_file_path(cli: &Cli) -> Option<Utf8PathBuf> {
    cli.config.clone().or_else(|| {
        ConfigDiscovery::builder("auto-tester")
            .env_var("AUTO_TESTER_CONFIG_PATH")
            .config_file_name("config.toml")
            .dotfile_name(".auto-tester.toml")
            .build()
            .candidates()
            .into_iter()
            .filter(|p| p.exists())
            .find_map(|p| Utf8PathBuf::try_from(p).ok())
    })
}

/// Load configuration with full layer precedence, reading the process
/// environment.
///
/// # Errors
///
/// Returns `ConfigError` if a configuration file is unreadable or malformed,
/// a typed environment variable has an invalid value, or the merged
/// configuration fails [`AppConfig::validate`].
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    load_config_with_env(cli, &mockable::DefaultEnv::new())
}

/// Load configuration with full layer precedence using `env` for the
/// environment layer.
///
/// # Errors
///
/// See [`load_config`].
pub fn load_config_with_env<E: mockable::Env>(cli: &Cli, env: &E) -> Result<AppConfig> {
    let mut composer = MergeComposer::new();

    let defaults =
        serde_json::to_value(AppConfig::default()).map_err(|e| ConfigError::ParseError {
            message: format!("failed to serialise defaults: {e}"),
        })?;
    composer.push_defaults(defaults);

    if let Some(path) = config_file_path(cli) {
        load_config_file(&path, &mut composer)?;
    }

    let env_values = collect_env_vars(env)?;
    if !env_values.is_null() {
        composer.push_environment(env_values);
    }

    let cli_overrides = build_cli_overrides(cli)?;
    if !cli_overrides.is_null() {
        composer.push_cli(cli_overrides);
    }

    let config =
        AppConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;
    config.validate()?;
    Ok(config)
}

/// Collect the `AUTO_TESTER_*` variables named in [`ENV_VAR_SPECS`] into a
/// JSON value.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if a typed variable has an
/// unparseable value.
fn collect_env_vars<E: mockable::Env>(env: &E) -> Result<Value> {
    let mut root = Map::new();

    for spec in ENV_VAR_SPECS {
        let Some(raw_value) = env.string(spec.env_var) else {
            continue;
        };

        let json_value = match spec.var_type {
            EnvVarType::String => Value::String(raw_value),
            EnvVarType::Bool => Value::Bool(raw_value.parse::<bool>().map_err(|_| {
                invalid_env(spec, format!("expected bool (true/false), got '{raw_value}'"))
            })?),
            EnvVarType::U64 => Value::Number(
                raw_value
                    .parse::<u64>()
                    .map_err(|_| {
                        invalid_env(spec, format!("expected unsigned integer, got '{raw_value}'"))
                    })?
                    .into(),
            ),
            EnvVarType::Strategy => {
                let strategy = HypothesisStrategy::from_str(&raw_value, true).map_err(|_| {
                    invalid_env(
                        spec,
                        format!("expected one of addition, arity, stub, got '{raw_value}'"),
                    )
                })?;
                strategy_value(strategy)?
            }
        };

        insert_at_path(&mut root, spec.path, json_value);
    }

    if root.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(root))
    }
}

fn invalid_env(spec: &EnvVarSpec, reason: String) -> ConfigError {
    ConfigError::InvalidValue {
        field: String::from(spec.env_var),
        reason,
    }
}

fn strategy_value(strategy: HypothesisStrategy) -> Result<Value> {
    serde_json::to_value(strategy).map_err(|e| {
        ConfigError::ParseError {
            message: format!("failed to serialise strategy: {e}"),
        }
        .into()
    })
}

/// Insert a value at a nested path in a JSON map, creating intermediate
/// objects as needed.
fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&field, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for &segment in parents {
        let entry = current
            .entry(String::from(segment))
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(obj) = entry.as_object_mut() else {
            return;
        };
        current = obj;
    }

    current.insert(String::from(field), value);
}

/// Build a JSON value containing CLI overrides.
fn build_cli_overrides(cli: &Cli) -> Result<Value> {
    let mut overrides = Map::new();

    if let Some(ref socket) = cli.engine_socket {
        insert_at_path(&mut overrides, &["engine_socket"], Value::String(socket.clone()));
    }
    if let Some(ref languages) = cli.languages {
        insert_at_path(
            &mut overrides,
            &["registry", "path"],
            Value::String(languages.to_string()),
        );
    }
    if let Some(strategy) = cli.strategy {
        insert_at_path(
            &mut overrides,
            &["synthesis", "strategy"],
            strategy_value(strategy)?,
        );
    }
    if let Some(timeout) = cli.timeout {
        insert_at_path(
            &mut overrides,
            &["sandbox", "timeout_secs"],
            Value::Number(timeout.into()),
        );
    }
    if cli.allow_network {
        insert_at_path(
            &mut overrides,
            &["sandbox", "network_disabled"],
            Value::Bool(false),
        );
    }
    if cli.keep_workdir {
        insert_at_path(&mut overrides, &["staging", "keep"], Value::Bool(true));
    }

    if overrides.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(overrides))
    }
}
