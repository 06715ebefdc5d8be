//! Remote shell and file-transfer transport abstraction.
//!
//! Node sessions never speak the SSH wire protocol themselves. They drive an
//! [`SshTransport`], which exposes a command channel and a file channel with
//! independent lifecycles. [`ProcessTransport`] shells out to the system
//! `ssh` and `scp` clients; tests substitute scripted doubles.

use thiserror::Error;

mod process;
mod util;

pub use process::ProcessTransport;
pub use util::expand_tilde;

/// One of the two channels a transport manages.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Channel {
    /// Command execution channel (SSH exec).
    Shell,
    /// File copy channel (SCP).
    FileTransfer,
}

/// Raw result of a remote command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteOutput {
    /// Exit code reported by the remote shell.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl RemoteOutput {
    /// Convenience constructor for a successful result.
    #[must_use]
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Convenience constructor for a failing result.
    #[must_use]
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Errors raised by a transport.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TransportError {
    /// The host could not be reached or refused authentication.
    #[error("failed to connect to {host}: {message}")]
    Connect {
        /// Host that was contacted.
        host: String,
        /// Description of the failure.
        message: String,
    },
    /// A local helper program could not be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// The remote session ended without reporting an exit status.
    #[error("{program} terminated without an exit status")]
    Terminated {
        /// Program whose session ended abnormally.
        program: String,
    },
    /// A file copy failed.
    #[error("failed to transfer {path}: {message}")]
    Transfer {
        /// Remote path involved in the transfer.
        path: String,
        /// Description of the failure.
        message: String,
    },
}

/// Interface to the external secure-shell client.
///
/// Implementations must be usable from several threads because a cluster
/// drives distinct nodes concurrently; a single node serialises its own
/// calls.
pub trait SshTransport: Send + Sync {
    /// Opens `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] when the host cannot be reached.
    fn connect(&self, channel: Channel) -> Result<(), TransportError>;

    /// Closes `channel`; closing a closed channel is not an error.
    ///
    /// # Errors
    ///
    /// Returns a transport error when teardown fails.
    fn disconnect(&self, channel: Channel) -> Result<(), TransportError>;

    /// Runs `command` through the remote shell and captures its output.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the command cannot be dispatched. A
    /// non-zero remote exit code is reported through [`RemoteOutput`].
    fn run(&self, command: &str) -> Result<RemoteOutput, TransportError>;

    /// Writes `contents` to `remote_path`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Transfer`] when the copy fails.
    fn upload(&self, contents: &[u8], remote_path: &str) -> Result<(), TransportError>;

    /// Reads the file at `remote_path`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Transfer`] when the copy fails.
    fn download(&self, remote_path: &str) -> Result<Vec<u8>, TransportError>;
}
