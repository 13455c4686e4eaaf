//! Classification of engine connection failures.
//!
//! Bollard connects lazily, so socket problems surface on the first request.
//! These helpers turn such errors into `SandboxError` variants that name the
//! socket path when one can be derived from the endpoint.

use std::io::ErrorKind;
use std::path::Path;

use bollard::errors::Error as BollardError;

use crate::error::SandboxError;

/// Return the filesystem path behind a `unix://` or `npipe://` endpoint.
///
/// HTTP endpoints and bare paths yield `None`.
pub(super) fn extract_socket_path(socket_uri: &str) -> Option<&Path> {
    socket_uri
        .strip_prefix("unix://")
        .or_else(|| socket_uri.strip_prefix("npipe://"))
        .map(Path::new)
}

/// Map a Bollard error raised while talking to `socket_uri` onto a
/// `SandboxError`.
pub(super) fn classify_connection_error(
    bollard_error: &BollardError,
    socket_uri: &str,
) -> SandboxError {
    let socket_path = extract_socket_path(socket_uri);
    let message = bollard_error.to_string();

    let kind = match bollard_error {
        BollardError::SocketNotFoundError(_) => Some(ErrorKind::NotFound),
        BollardError::IOError { err } => Some(io_kind_in_chain(err).unwrap_or_else(|| err.kind())),
        other => io_kind_in_chain(other),
    };

    match (kind, socket_path) {
        (Some(ErrorKind::NotFound), Some(path)) => SandboxError::SocketNotFound {
            path: path.to_path_buf(),
        },
        (Some(ErrorKind::PermissionDenied), Some(path)) => SandboxError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => SandboxError::ConnectionFailed { message },
    }
}

/// Find the first `io::Error` among the sources of `error`.
fn io_kind_in_chain(error: &dyn std::error::Error) -> Option<ErrorKind> {
    let mut current = error.source();
    while let Some(cause) = current {
        if let Some(io_error) = cause.downcast_ref::<std::io::Error>() {
            return Some(io_error.kind());
        }
        current = cause.source();
    }
    None
}
