//! Container engine connection and sandboxed execution.
//!
//! The engine socket is resolved through a priority-based fallback chain:
//!
//! 1. CLI argument (`--engine-socket`)
//! 2. Config file (`engine_socket` in TOML)
//! 3. `AUTO_TESTER_ENGINE_SOCKET` environment variable
//! 4. `DOCKER_HOST` environment variable
//! 5. `CONTAINER_HOST` environment variable
//! 6. `PODMAN_HOST` environment variable
//! 7. Platform default (`/var/run/docker.sock` on Unix)
//!
//! Each run gets a fresh container that is removed when the run ends.

mod connection;

pub use connection::{
    ContainerLogsFuture, CreateContainerFuture, DEFAULT_APP_DIR, DEFAULT_TIMEOUT_SECS,
    EngineCallFuture, EngineConnector, ExecutionOutcome, SandboxClient, SandboxRequest,
    SocketResolver, WaitContainerFuture, combine_output, image_pull_options,
};
