//! Errors raised by node sessions.

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::bundle::BundleError;
use crate::transport::TransportError;

/// Errors surfaced by [`super::NodeProxy`] operations.
///
/// A remote command exiting non-zero is not an error; it is reported through
/// [`crate::CommandResponse::exit_code`].
#[derive(Debug, Error)]
pub enum NodeError {
    /// The session was disposed and can no longer be used.
    #[error("node {node} has been disposed")]
    Disposed {
        /// Display name of the node.
        node: String,
    },
    /// A file operation was attempted on a faulted session.
    #[error("node {node} is faulted")]
    Faulted {
        /// Display name of the node.
        node: String,
    },
    /// A sudo command contained a single quote, which the `bash -c` wrapper
    /// cannot carry.
    #[error("sudo command `{command}` contains a single quote; run it as a command bundle instead")]
    QuoteInSudoCommand {
        /// The rejected command (redacted when classified).
        command: String,
    },
    /// The configured remote `PATH` contains a single quote and cannot be
    /// exported inside the `sudo bash -c` wrapper.
    #[error("node {node} remote path `{remote_path}` contains a single quote and cannot be used with sudo")]
    QuoteInRemotePath {
        /// Display name of the node.
        node: String,
        /// The configured remote path.
        remote_path: String,
    },
    /// The host stayed unreachable until the connection deadline passed.
    #[error("node {node} unreachable after {timeout_secs}s: {source}")]
    Timeout {
        /// Display name of the node.
        node: String,
        /// Deadline that elapsed, in seconds.
        timeout_secs: u64,
        /// Last connection failure.
        source: TransportError,
    },
    /// A caller-supplied argument was rejected before any network call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The transport failed; propagated unchanged.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The command bundle was invalid or could not be packed.
    #[error(transparent)]
    Bundle(#[from] BundleError),
    /// An internal protocol step (folder creation, unpacking, moving an
    /// upload into place) exited non-zero.
    #[error("node {node}: {step} failed with exit code {exit_code}: {message}")]
    Step {
        /// Display name of the node.
        node: String,
        /// Step description.
        step: String,
        /// Remote exit code.
        exit_code: i32,
        /// Captured error text.
        message: String,
    },
    /// A certificate bundle could not be parsed.
    #[error("invalid certificate: {0}")]
    Certificate(String),
    /// A local file system operation failed.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Local path involved.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
}
