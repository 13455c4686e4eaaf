//! One-shot sandbox runs: create, start, bounded wait, logs, teardown.
//!
//! The engine calls sit behind [`SandboxClient`] so the run lifecycle can be
//! exercised without a daemon. Once a container exists it is force-removed on
//! every path, including timeouts and cancellation. Cancellation is honoured
//! from the first engine call: a run cancelled while its container is being
//! created removes the container by name.

use std::future::Future;
use std::pin::{Pin, pin};
use std::time::Duration;

use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, ContainerCreateResponse, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions, CreateContainerOptionsBuilder, CreateImageOptions,
    CreateImageOptionsBuilder, LogsOptionsBuilder, RemoveContainerOptionsBuilder,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::Docker;
use camino::{Utf8Path, Utf8PathBuf};
use futures_util::{StreamExt, TryStreamExt};

use super::EngineConnector;
use crate::error::{ConfigError, SandboxError, TesterError};

/// Default in-sandbox directory the staged test is mounted into.
pub const DEFAULT_APP_DIR: &str = "/app";

/// Default wall-clock limit for a sandbox run.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

const SHELL: &str = "/bin/sh";
const RUN_LABEL: &str = "auto-tester.run";
const NETWORK_NONE: &str = "none";
const IMAGE_NOT_FOUND: u16 = 404;

/// Boxed future returned by [`SandboxClient::create_container`].
pub type CreateContainerFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ContainerCreateResponse, BollardError>> + Send + 'a>>;

/// Boxed future returned by [`SandboxClient::wait_container`].
pub type WaitContainerFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Option<i64>, BollardError>> + Send + 'a>>;

/// Boxed future returned by [`SandboxClient::container_logs`].
pub type ContainerLogsFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<LogOutput>, BollardError>> + Send + 'a>>;

/// Boxed future for engine calls without a payload.
pub type EngineCallFuture<'a> = Pin<Box<dyn Future<Output = Result<(), BollardError>> + Send + 'a>>;

/// Engine operations needed to run one sandboxed command.
pub trait SandboxClient {
    /// Create a container from `Bollard` options and body payload.
    fn create_container(
        &self,
        options: Option<CreateContainerOptions>,
        config: ContainerCreateBody,
    ) -> CreateContainerFuture<'_>;

    /// Pull an image, draining the progress stream.
    fn pull_image(&self, options: CreateImageOptions) -> EngineCallFuture<'_>;

    /// Start a created container.
    fn start_container(&self, container_id: &str) -> EngineCallFuture<'_>;

    /// Wait for the container to exit and return its status code, or `None`
    /// when the engine closed the wait without reporting one.
    fn wait_container(&self, container_id: &str) -> WaitContainerFuture<'_>;

    /// Fetch everything the container wrote to stdout and stderr.
    fn container_logs(&self, container_id: &str) -> ContainerLogsFuture<'_>;

    /// Force-remove the container and its anonymous volumes.
    fn remove_container(&self, container_id: &str) -> EngineCallFuture<'_>;
}

impl SandboxClient for Docker {
    fn create_container(
        &self,
        options: Option<CreateContainerOptions>,
        config: ContainerCreateBody,
    ) -> CreateContainerFuture<'_> {
        Box::pin(async move { Self::create_container(self, options, config).await })
    }

    fn pull_image(&self, options: CreateImageOptions) -> EngineCallFuture<'_> {
        Box::pin(async move {
            Self::create_image(self, Some(options), None, None)
                .try_collect::<Vec<_>>()
                .await?;
            Ok(())
        })
    }

    fn start_container(&self, container_id: &str) -> EngineCallFuture<'_> {
        let id = String::from(container_id);
        Box::pin(async move { Self::start_container(self, &id, None::<StartContainerOptions>).await })
    }

    fn wait_container(&self, container_id: &str) -> WaitContainerFuture<'_> {
        let id = String::from(container_id);
        Box::pin(async move {
            let mut responses =
                Box::pin(Self::wait_container(self, &id, None::<WaitContainerOptions>));
            match responses.next().await {
                Some(Ok(response)) => Ok(Some(response.status_code)),
                // Bollard surfaces non-zero exits as an error carrying the code.
                Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(Some(code)),
                Some(Err(error)) => Err(error),
                None => Ok(None),
            }
        })
    }

    fn container_logs(&self, container_id: &str) -> ContainerLogsFuture<'_> {
        let id = String::from(container_id);
        Box::pin(async move {
            let options = LogsOptionsBuilder::new().stdout(true).stderr(true).build();
            Self::logs(self, &id, Some(options)).try_collect().await
        })
    }

    fn remove_container(&self, container_id: &str) -> EngineCallFuture<'_> {
        let id = String::from(container_id);
        Box::pin(async move {
            let options = RemoveContainerOptionsBuilder::new().force(true).v(true).build();
            Self::remove_container(self, &id, Some(options)).await
        })
    }
}

/// Parameters for one sandbox run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxRequest {
    image: String,
    command: String,
    host_test_path: Utf8PathBuf,
    app_dir: String,
    timeout: Duration,
    network_disabled: bool,
    name: Option<String>,
}

impl SandboxRequest {
    /// Build a request running `command` in `image` against the staged test
    /// at `host_test_path`.
    ///
    /// Defaults: application directory `/app`, a five minute timeout, and
    /// networking disabled.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` when `image` or `command` is
    /// blank, and `ConfigError::InvalidValue` when the test path has no file
    /// name.
    pub fn new(
        image: impl Into<String>,
        command: impl Into<String>,
        host_test_path: impl Into<Utf8PathBuf>,
    ) -> Result<Self, TesterError> {
        let image_value = image.into();
        let command_value = command.into();
        let path = host_test_path.into();

        let validated_image = String::from(require_non_blank("image", &image_value)?);
        let validated_command = String::from(require_non_blank("command", &command_value)?);
        if path.file_name().is_none() {
            return Err(TesterError::from(ConfigError::InvalidValue {
                field: String::from("host_test_path"),
                reason: format!("'{path}' does not name a file"),
            }));
        }

        Ok(Self {
            image: validated_image,
            command: validated_command,
            host_test_path: path,
            app_dir: String::from(DEFAULT_APP_DIR),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            network_disabled: true,
            name: None,
        })
    }

    /// Set the in-sandbox application directory.
    #[must_use]
    pub fn with_app_dir(mut self, app_dir: impl Into<String>) -> Self {
        self.app_dir = app_dir.into();
        self
    }

    /// Set the wall-clock limit for the run.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Choose whether the sandbox gets a network.
    #[must_use]
    pub const fn with_network_disabled(mut self, disabled: bool) -> Self {
        self.network_disabled = disabled;
        self
    }

    /// Attach an optional container name; blank names are ignored.
    #[must_use]
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name.filter(|value| !value.trim().is_empty());
        self
    }

    /// Return the image reference.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Return the shell command run inside the sandbox.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Return the host path of the staged test.
    #[must_use]
    pub fn host_test_path(&self) -> &Utf8Path {
        &self.host_test_path
    }

    /// Return the in-sandbox application directory.
    #[must_use]
    pub fn app_dir(&self) -> &str {
        &self.app_dir
    }

    /// Return the wall-clock limit.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Return whether networking is disabled.
    #[must_use]
    pub const fn network_disabled(&self) -> bool {
        self.network_disabled
    }

    /// Return the optional container name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn container_test_path(&self) -> String {
        let file_name = self.host_test_path.file_name().unwrap_or_default();
        format!("{}/{file_name}", self.app_dir.trim_end_matches('/'))
    }
}

/// What a sandbox run produced.
#[derive(Debug)]
pub struct ExecutionOutcome {
    combined_output: String,
    exit_error: Option<SandboxError>,
}

impl ExecutionOutcome {
    /// Return stdout and stderr interleaved in the order the engine reported.
    #[must_use]
    pub fn combined_output(&self) -> &str {
        &self.combined_output
    }

    /// Return why the command did not succeed, if it did not.
    #[must_use]
    pub const fn exit_error(&self) -> Option<&SandboxError> {
        self.exit_error.as_ref()
    }

    /// Return `true` when the command exited with status zero.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.exit_error.is_none()
    }

    fn cancelled() -> Self {
        Self {
            combined_output: String::new(),
            exit_error: Some(SandboxError::Cancelled),
        }
    }

    /// Split into captured output and exit error.
    #[must_use]
    pub fn into_parts(self) -> (String, Option<SandboxError>) {
        (self.combined_output, self.exit_error)
    }
}

impl EngineConnector {
    /// Run `request` to completion in a fresh container (async version).
    ///
    /// Every engine step up to the end of the wait is raced against `cancel`,
    /// and the wait is bounded by the request timeout.
    /// A non-zero exit, timeout, or cancellation is reported through
    /// [`ExecutionOutcome::exit_error`] together with whatever output was
    /// captured.
    ///
    /// # Errors
    ///
    /// Returns `SandboxError::CreateFailed`, `ImagePullFailed`, or
    /// `StartFailed` when the container cannot be brought up, and
    /// `WaitFailed` or `LogsFailed` when the engine fails mid-run.
    pub async fn run_sandbox_async<C, F>(
        client: &C,
        request: &SandboxRequest,
        cancel: F,
    ) -> Result<ExecutionOutcome, TesterError>
    where
        C: SandboxClient + Sync,
        F: Future<Output = ()> + Send,
    {
        let mut cancel = pin!(cancel);
        let created = tokio::select! {
            biased;
            () = &mut cancel => None,
            created = create_with_pull(client, request) => Some(created?),
        };
        let Some(container_id) = created else {
            remove_abandoned(client, request).await;
            return Ok(ExecutionOutcome::cancelled());
        };
        tracing::debug!(container = %container_id, image = request.image(), "created sandbox");

        let result = drive_container(client, request, &container_id, cancel).await;

        match client.remove_container(&container_id).await {
            Ok(()) => tracing::debug!(container = %container_id, "removed sandbox"),
            Err(error) => tracing::warn!(
                container = %container_id,
                error = %error,
                "failed to remove sandbox container"
            ),
        }

        result
    }

    /// Run `request` to completion in a fresh container.
    ///
    /// This synchronous helper blocks on [`Self::run_sandbox_async`] using an
    /// existing Tokio runtime handle supplied by the caller.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::run_sandbox_async`].
    pub fn run_sandbox<C, F>(
        runtime: &tokio::runtime::Handle,
        client: &C,
        request: &SandboxRequest,
        cancel: F,
    ) -> Result<ExecutionOutcome, TesterError>
    where
        C: SandboxClient + Sync,
        F: Future<Output = ()> + Send,
    {
        runtime.block_on(Self::run_sandbox_async(client, request, cancel))
    }
}

async fn create_with_pull<C: SandboxClient>(
    client: &C,
    request: &SandboxRequest,
) -> Result<String, TesterError> {
    let create = || {
        client.create_container(
            build_create_options(request.name()),
            build_create_body(request),
        )
    };

    let response = match create().await {
        Ok(response) => response,
        Err(error) if is_image_missing(&error) => {
            tracing::info!(image = request.image(), "pulling sandbox image");
            client
                .pull_image(image_pull_options(request.image()))
                .await
                .map_err(|pull_error| {
                    TesterError::from(SandboxError::ImagePullFailed {
                        image: String::from(request.image()),
                        message: pull_error.to_string(),
                    })
                })?;
            create().await.map_err(|retry_error| create_failed(&retry_error))?
        }
        Err(error) => return Err(create_failed(&error)),
    };

    for warning in &response.warnings {
        tracing::warn!(warning = %warning, "engine warning on sandbox creation");
    }
    Ok(response.id)
}

/// Remove a container whose creation was interrupted. The engine may or may
/// not have created it, so a failure here is expected.
async fn remove_abandoned<C: SandboxClient>(client: &C, request: &SandboxRequest) {
    let Some(name) = request.name() else {
        tracing::warn!(
            image = request.image(),
            "run cancelled during creation; an unnamed container may remain"
        );
        return;
    };
    match client.remove_container(name).await {
        Ok(()) => tracing::debug!(container = name, "removed sandbox cancelled during creation"),
        Err(error) => tracing::debug!(
            container = name,
            error = %error,
            "no sandbox to remove after cancellation"
        ),
    }
}

async fn drive_container<C, F>(
    client: &C,
    request: &SandboxRequest,
    container_id: &str,
    mut cancel: F,
) -> Result<ExecutionOutcome, TesterError>
where
    C: SandboxClient,
    F: Future<Output = ()> + Unpin,
{
    let started = tokio::select! {
        biased;
        () = &mut cancel => None,
        started = client.start_container(container_id) => Some(started),
    };
    let Some(started) = started else {
        return Ok(ExecutionOutcome::cancelled());
    };
    started.map_err(|error| {
        TesterError::from(SandboxError::StartFailed {
            container_id: String::from(container_id),
            message: error.to_string(),
        })
    })?;
    tracing::debug!(container = %container_id, command = request.command(), "started sandbox");

    let exit_error = tokio::select! {
        waited = tokio::time::timeout(request.timeout(), client.wait_container(container_id)) => {
            match waited {
                Ok(Ok(Some(0))) => None,
                Ok(Ok(Some(code))) => Some(SandboxError::NonZeroExit { code }),
                Ok(Ok(None)) => return Err(wait_failed(container_id, "engine reported no exit status")),
                Ok(Err(error)) => return Err(wait_failed(container_id, &error.to_string())),
                Err(_) => Some(SandboxError::Timeout {
                    seconds: request.timeout().as_secs(),
                }),
            }
        }
        () = &mut cancel => Some(SandboxError::Cancelled),
    };

    let combined_output = match client.container_logs(container_id).await {
        Ok(chunks) => combine_output(&chunks),
        Err(error) if exit_error.is_some() => {
            tracing::warn!(container = %container_id, error = %error, "could not read sandbox output");
            String::new()
        }
        Err(error) => {
            return Err(TesterError::from(SandboxError::LogsFailed {
                container_id: String::from(container_id),
                message: error.to_string(),
            }));
        }
    };

    Ok(ExecutionOutcome {
        combined_output,
        exit_error,
    })
}

/// Concatenate log frames into one string, decoding lossily.
#[must_use]
pub fn combine_output(chunks: &[LogOutput]) -> String {
    chunks
        .iter()
        .map(|chunk| match chunk {
            LogOutput::StdOut { message }
            | LogOutput::StdErr { message }
            | LogOutput::Console { message }
            | LogOutput::StdIn { message } => String::from_utf8_lossy(message),
        })
        .collect()
}

/// Build pull options for `image`, defaulting the tag to `latest` when the
/// reference names neither a tag nor a digest.
#[must_use]
pub fn image_pull_options(image: &str) -> CreateImageOptions {
    let last_segment = image.rsplit('/').next().unwrap_or(image);
    let builder = CreateImageOptionsBuilder::new().from_image(image);
    if last_segment.contains(':') || image.contains('@') {
        builder.build()
    } else {
        builder.tag("latest").build()
    }
}

fn build_create_options(name: Option<&str>) -> Option<CreateContainerOptions> {
    name.map(|container_name| {
        CreateContainerOptionsBuilder::new()
            .name(container_name)
            .build()
    })
}

fn build_create_body(request: &SandboxRequest) -> ContainerCreateBody {
    let bind = format!("{}:{}", request.host_test_path(), request.container_test_path());
    let labels = request
        .name()
        .map(|name| [(String::from(RUN_LABEL), String::from(name))].into_iter().collect());

    ContainerCreateBody {
        image: Some(String::from(request.image())),
        cmd: Some(vec![
            String::from(SHELL),
            String::from("-c"),
            String::from(request.command()),
        ]),
        working_dir: Some(String::from(request.app_dir())),
        labels,
        host_config: Some(HostConfig {
            binds: Some(vec![bind]),
            network_mode: request
                .network_disabled()
                .then(|| String::from(NETWORK_NONE)),
            ..HostConfig::default()
        }),
        ..ContainerCreateBody::default()
    }
}

const fn is_image_missing(error: &BollardError) -> bool {
    matches!(
        error,
        BollardError::DockerResponseServerError {
            status_code: IMAGE_NOT_FOUND,
            ..
        }
    )
}

fn create_failed(error: &BollardError) -> TesterError {
    TesterError::from(SandboxError::CreateFailed {
        message: error.to_string(),
    })
}

fn wait_failed(container_id: &str, message: &str) -> TesterError {
    TesterError::from(SandboxError::WaitFailed {
        container_id: String::from(container_id),
        message: String::from(message),
    })
}

fn require_non_blank<'a>(field: &str, value: &'a str) -> Result<&'a str, TesterError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TesterError::from(ConfigError::MissingRequired {
            field: String::from(field),
        }));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests;
