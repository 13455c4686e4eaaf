//! Semantic error types for the auto-tester application.
//!
//! This module defines the error hierarchy for auto-tester, following the
//! principle of using semantic error enums (via `thiserror`) for conditions the
//! caller might inspect or map to an exit status, while reserving opaque errors
//! (`eyre::Report`) for the application boundary.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A required configuration value is missing.
    #[error("missing required configuration: {field}")]
    MissingRequired {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The command line could not be parsed.
    #[error("usage error: {message}")]
    Usage {
        /// The message reported by the argument parser.
        message: String,
    },

    /// The `OrthoConfig` library returned an error during configuration loading.
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

impl From<clap::Error> for ConfigError {
    fn from(error: clap::Error) -> Self {
        let rendered = error.to_string();
        Self::Usage {
            message: String::from(rendered.trim_start_matches("error: ").trim_end()),
        }
    }
}

/// Errors raised while resolving a language to its execution profile.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The language mapping file could not be read.
    #[error("failed to read language configuration '{path}': {message}")]
    Unreadable {
        /// The mapping file path.
        path: PathBuf,
        /// A description of the read failure.
        message: String,
    },

    /// The language mapping file could not be decoded.
    #[error("malformed language configuration '{path}': {message}")]
    Malformed {
        /// The mapping file path.
        path: PathBuf,
        /// A description of the decoding failure.
        message: String,
    },

    /// The language is not present in the mapping.
    #[error("unsupported language: {language} (configured: {})", available.join(", "))]
    UnsupportedLanguage {
        /// The identifier that was requested.
        language: String,
        /// Identifiers the mapping does configure, in sorted order.
        available: Vec<String>,
    },
}

/// Errors that can occur while talking to the container engine or running
/// the sandbox.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Failed to connect to the container engine socket.
    #[error("failed to connect to container engine: {message}")]
    ConnectionFailed {
        /// A description of the connection failure.
        message: String,
    },

    /// The container engine socket was not found.
    #[error("container engine socket not found: {path}")]
    SocketNotFound {
        /// The path where the socket was expected.
        path: PathBuf,
    },

    /// Permission denied when accessing the container engine socket.
    #[error("permission denied accessing container socket: {path}")]
    PermissionDenied {
        /// The path to the socket.
        path: PathBuf,
    },

    /// Health check failed - engine did not respond correctly.
    #[error("container engine health check failed: {message}")]
    HealthCheckFailed {
        /// A description of the health check failure.
        message: String,
    },

    /// Health check timed out.
    #[error("container engine health check timed out after {seconds} seconds")]
    HealthCheckTimeout {
        /// The timeout duration in seconds.
        seconds: u64,
    },

    /// The async runtime used to drive the engine client could not be built.
    #[error("failed to create async runtime: {message}")]
    RuntimeCreationFailed {
        /// A description of the runtime failure.
        message: String,
    },

    /// Pulling the sandbox image failed.
    #[error("failed to pull image '{image}': {message}")]
    ImagePullFailed {
        /// The image reference.
        image: String,
        /// A description of the pull failure.
        message: String,
    },

    /// Failed to create the sandbox container.
    #[error("failed to create container: {message}")]
    CreateFailed {
        /// A description of the creation failure.
        message: String,
    },

    /// Failed to start the sandbox container.
    #[error("failed to start container '{container_id}': {message}")]
    StartFailed {
        /// The ID of the container that failed to start.
        container_id: String,
        /// A description of the start failure.
        message: String,
    },

    /// Waiting for the sandbox container to exit failed.
    #[error("failed to wait for container '{container_id}': {message}")]
    WaitFailed {
        /// The ID of the container.
        container_id: String,
        /// A description of the wait failure.
        message: String,
    },

    /// Reading the sandbox output failed.
    #[error("failed to read output of container '{container_id}': {message}")]
    LogsFailed {
        /// The ID of the container.
        container_id: String,
        /// A description of the log failure.
        message: String,
    },

    /// The sandboxed command exited with a non-zero status.
    #[error("sandboxed command exited with status {code}")]
    NonZeroExit {
        /// The exit status reported by the engine.
        code: i64,
    },

    /// The sandboxed command did not finish in time and was torn down.
    #[error("sandboxed command timed out after {seconds} seconds")]
    Timeout {
        /// The configured limit in seconds.
        seconds: u64,
    },

    /// The run was cancelled by the operator and the sandbox torn down.
    #[error("sandboxed command was cancelled")]
    Cancelled,
}

/// Errors that can occur during filesystem operations.
#[derive(Debug, Error)]
pub enum FilesystemError {
    /// A file or directory was not found.
    #[error("path not found: {path}")]
    NotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// Permission denied when accessing a path.
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// The path that could not be accessed.
        path: PathBuf,
    },

    /// An I/O error occurred.
    #[error("I/O error at '{path}': {message}")]
    IoError {
        /// The path where the error occurred.
        path: PathBuf,
        /// A description of the I/O error.
        message: String,
    },
}

impl FilesystemError {
    /// Classify an I/O error raised while touching `path`.
    #[must_use]
    pub fn from_io(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        let error_path = path.into();
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path: error_path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path: error_path },
            _ => Self::IoError {
                path: error_path,
                message: error.to_string(),
            },
        }
    }
}

/// Top-level error type for the auto-tester application.
///
/// This enum aggregates all domain-specific errors into a single type that can
/// be used throughout the pipeline. At the application boundary (main.rs),
/// these errors are converted to `eyre::Report` for human-readable reporting.
#[derive(Debug, Error)]
pub enum TesterError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The language could not be resolved to an execution profile.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// An error occurred during sandbox operations.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// An error occurred during filesystem operations.
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
}

/// A specialised `Result` type for auto-tester operations.
pub type Result<T> = std::result::Result<T, TesterError>;
