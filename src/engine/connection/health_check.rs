//! Health check and connect-and-verify functionality.

use std::time::Duration;

use bollard::Docker;

use super::error_classification::classify_connection_error;
use super::{EngineConnector, HEALTH_CHECK_TIMEOUT_SECS, SocketResolver};
use crate::error::{SandboxError, TesterError};

impl EngineConnector {
    /// Perform a ping with timeout.
    ///
    /// Ping failures carrying an I/O cause (missing socket, permission denied)
    /// are classified against `socket`; anything else is a failed health check.
    async fn ping_with_timeout(docker: &Docker, socket: &str) -> Result<(), TesterError> {
        let timeout = Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS);

        tokio::time::timeout(timeout, docker.ping())
            .await
            .map_err(|_| {
                TesterError::from(SandboxError::HealthCheckTimeout {
                    seconds: HEALTH_CHECK_TIMEOUT_SECS,
                })
            })?
            .map_err(|e| {
                let classified = classify_connection_error(&e, socket);
                let error = match classified {
                    SandboxError::ConnectionFailed { message } => {
                        SandboxError::HealthCheckFailed { message }
                    }
                    other => other,
                };
                TesterError::from(error)
            })?;
        Ok(())
    }

    /// Verify the container engine behind `socket` is responsive.
    ///
    /// # Errors
    ///
    /// Returns `SandboxError::HealthCheckFailed`, `SocketNotFound`, or
    /// `PermissionDenied` if the engine does not answer, and
    /// `SandboxError::HealthCheckTimeout` if the check times out.
    pub async fn health_check_async(docker: &Docker, socket: &str) -> Result<(), TesterError> {
        Self::ping_with_timeout(docker, socket).await
    }

    /// Connect using fallback resolution and verify the engine responds
    /// (async version).
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::connect`] and [`Self::health_check_async`].
    pub async fn connect_with_fallback_and_verify_async<E: mockable::Env>(
        config_socket: Option<&str>,
        resolver: &SocketResolver<'_, E>,
    ) -> Result<Docker, TesterError> {
        let socket = Self::resolve_socket(config_socket, resolver);
        let docker = Self::connect(&socket)?;
        Self::ping_with_timeout(&docker, &socket).await?;
        tracing::debug!(socket = %socket, "container engine is responsive");
        Ok(docker)
    }

    /// Connect using fallback resolution and verify the engine responds.
    ///
    /// This synchronous helper blocks on
    /// [`Self::connect_with_fallback_and_verify_async`] using a caller-provided
    /// runtime handle.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::connect`] and [`Self::health_check_async`].
    pub fn connect_with_fallback_and_verify<E: mockable::Env>(
        runtime: &tokio::runtime::Handle,
        config_socket: Option<&str>,
        resolver: &SocketResolver<'_, E>,
    ) -> Result<Docker, TesterError> {
        runtime.block_on(Self::connect_with_fallback_and_verify_async(
            config_socket,
            resolver,
        ))
    }
}
