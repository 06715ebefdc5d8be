//! Per-host session management.
//!
//! A [`NodeProxy`] owns one host's command and file-transfer channels,
//! translates high-level operations (run, sudo, bundles, uploads) into
//! transport calls, and tracks two small state machines:
//!
//! * connection: `Disconnected → Connecting → Connected → Disconnected`, with
//!   `Disposed` as a terminal state;
//! * health: `Ready → Faulted`, where `Faulted` is permanent for the
//!   lifetime of the instance.
//!
//! A session is not meant to be driven by several callers at once. The
//! internal mutex guards connection establishment and disposal only;
//! callers serialise command execution themselves.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_REMOTE_PATH, NodeConfig};
use crate::layout::EXEC_FOLDER;
use crate::run_options::RunOptions;
use crate::transport::{Channel, ProcessTransport, SshTransport};

mod bundle_exec;
mod error;
mod exec;
mod files;
mod maintenance;

pub use error::NodeError;
pub use maintenance::{CERT_CA_PATH, CERT_LEAF_PATH, DOCKER_ATTEMPTS, DOCKER_RETRY_DELAY};

/// Delay between connection attempts.
pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Lifecycle of the command channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    /// No channel is open; the session may connect.
    Disconnected,
    /// A connection attempt is in progress.
    Connecting,
    /// The command channel is open.
    Connected,
    /// The session was disposed and is unusable.
    Disposed,
}

#[derive(Debug)]
struct SessionState {
    shell: ConnectionState,
    transfer_open: bool,
    status: String,
    faulted: bool,
    ready: bool,
    upload_folder_ready: bool,
}

type LogWriter = Box<dyn Write + Send>;

/// Session manager for a single remote host.
///
/// `M` carries caller-defined metadata (for example the node's cluster
/// definition); `T` is the transport used to reach the host.
pub struct NodeProxy<M, T: SshTransport = ProcessTransport> {
    name: String,
    address: String,
    metadata: M,
    transport: T,
    clock: Arc<dyn Clock>,
    remote_path: String,
    exec_root: String,
    connect_timeout: Duration,
    default_options: RunOptions,
    state: Mutex<SessionState>,
    connect_gate: Mutex<()>,
    log_writer: Mutex<Option<LogWriter>>,
}

impl<M> NodeProxy<M, ProcessTransport> {
    /// Builds a session that reaches `address` through the system `ssh`
    /// and `scp` clients.
    #[must_use]
    pub fn from_config(
        name: impl Into<String>,
        address: impl Into<String>,
        metadata: M,
        config: &NodeConfig,
    ) -> Self {
        let host: String = address.into();
        let transport = ProcessTransport::new(config.clone(), host.clone());
        Self::new(name, host, metadata, transport)
            .with_remote_path(config.remote_path.clone())
            .with_connect_timeout(config.connect_timeout())
    }
}

impl<M, T: SshTransport> NodeProxy<M, T> {
    /// Creates a disconnected, ready-to-use session.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        metadata: M,
        transport: T,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            metadata,
            transport,
            clock: Arc::new(SystemClock),
            remote_path: String::from(DEFAULT_REMOTE_PATH),
            exec_root: String::from(EXEC_FOLDER),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            default_options: RunOptions::NONE,
            state: Mutex::new(SessionState {
                shell: ConnectionState::Disconnected,
                transfer_open: false,
                status: String::new(),
                faulted: false,
                ready: false,
                upload_folder_ready: false,
            }),
            connect_gate: Mutex::new(()),
            log_writer: Mutex::new(None),
        }
    }

    /// Replaces the clock used for retry delays and unique names.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the value exported as `PATH` before each command. An empty
    /// value disables the export.
    #[must_use]
    pub fn with_remote_path(mut self, remote_path: impl Into<String>) -> Self {
        self.remote_path = remote_path.into();
        self
    }

    /// Moves the root under which command bundles are extracted.
    #[must_use]
    pub fn with_exec_root(mut self, exec_root: impl Into<String>) -> Self {
        self.exec_root = exec_root.into();
        self
    }

    /// Sets the default connection deadline.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the flags merged in when a call passes
    /// [`RunOptions::USE_DEFAULTS`].
    #[must_use]
    pub const fn with_default_options(mut self, options: RunOptions) -> Self {
        self.default_options = options;
        self
    }

    /// Mirrors every log line to `writer`.
    #[must_use]
    pub fn with_log_writer(self, writer: impl Write + Send + 'static) -> Self {
        *self.log_writer.lock() = Some(Box::new(writer));
        self
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Host address or FQDN.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Caller-defined metadata.
    #[must_use]
    pub const fn metadata(&self) -> &M {
        &self.metadata
    }

    /// Underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Value exported as `PATH` before each command.
    #[must_use]
    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    /// Root under which command bundles are extracted.
    #[must_use]
    pub fn exec_root(&self) -> &str {
        &self.exec_root
    }

    /// Default connection deadline.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Current state of the command channel.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.state.lock().shell
    }

    /// Whether the file-transfer channel is open.
    #[must_use]
    pub fn is_transfer_connected(&self) -> bool {
        self.state.lock().transfer_open
    }

    /// Free-text status line.
    #[must_use]
    pub fn status(&self) -> String {
        self.state.lock().status.clone()
    }

    /// Replaces the status line.
    pub fn set_status(&self, status: impl Into<String>) {
        self.state.lock().status = status.into();
    }

    /// Whether the session has faulted.
    #[must_use]
    pub fn is_faulted(&self) -> bool {
        self.state.lock().faulted
    }

    /// `true` when the caller flagged the session ready and it has not
    /// faulted.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        let state = self.state.lock();
        state.ready && !state.faulted
    }

    /// Flags completion (or not) of the caller's setup phase.
    pub fn set_ready(&self, ready: bool) {
        self.state.lock().ready = ready;
    }

    /// Moves the session into the permanent faulted state.
    pub fn fault(&self, message: &str) {
        {
            let mut state = self.state.lock();
            state.faulted = true;
            state.status = if message.is_empty() {
                String::from("ERROR")
            } else {
                format!("ERROR: {message}")
            };
        }
        self.log_warn(&format!("FAULTED: {message}"));
    }

    /// Opens the command channel, retrying until the configured deadline.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Disposed`] for a disposed session or
    /// [`NodeError::Timeout`] once the deadline passes.
    pub fn connect(&self) -> Result<(), NodeError> {
        self.connect_with_timeout(self.connect_timeout)
    }

    /// Opens the command channel, retrying every
    /// [`CONNECT_RETRY_INTERVAL`] until `timeout` elapses. A zero timeout
    /// makes a single attempt.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Disposed`] for a disposed session or
    /// [`NodeError::Timeout`], carrying the last transport error, once the
    /// deadline passes.
    pub fn connect_with_timeout(&self, timeout: Duration) -> Result<(), NodeError> {
        // Attempts serialise on the gate. The session state is not locked
        // while retrying.
        let _gate = self.connect_gate.lock();
        {
            let mut state = self.state.lock();
            match state.shell {
                ConnectionState::Disposed => return Err(self.disposed()),
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Disconnected | ConnectionState::Connecting => {}
            }
            state.shell = ConnectionState::Connecting;
        }

        let opened = self.open_with_retry(Channel::Shell, timeout);
        let mut state = self.state.lock();
        if state.shell == ConnectionState::Disposed {
            if opened.is_ok() {
                self.close_quietly(Channel::Shell);
            }
            return Err(self.disposed());
        }
        match opened {
            Ok(()) => {
                state.shell = ConnectionState::Connected;
                Ok(())
            }
            Err(err) => {
                state.shell = ConnectionState::Disconnected;
                Err(err)
            }
        }
    }

    /// Drops any open channel and reconnects, waiting up to `timeout` for
    /// the host to come back (for example after a reboot).
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Timeout`] when the host stays unreachable.
    pub fn wait_for_boot(&self, timeout: Duration) -> Result<(), NodeError> {
        self.disconnect();
        self.connect_with_timeout(timeout)
    }

    /// Closes both channels, ignoring teardown failures. The session may
    /// reconnect afterwards; disconnecting twice is harmless.
    pub fn disconnect(&self) {
        let mut state = self.state.lock();
        self.teardown(&mut state);
        if state.shell != ConnectionState::Disposed {
            state.shell = ConnectionState::Disconnected;
        }
    }

    /// Closes both channels and makes the session permanently unusable.
    pub fn dispose(&self) {
        let mut state = self.state.lock();
        self.teardown(&mut state);
        state.shell = ConnectionState::Disposed;
    }

    fn teardown(&self, state: &mut SessionState) {
        if state.shell == ConnectionState::Connected {
            self.close_quietly(Channel::Shell);
        }
        if state.transfer_open {
            self.close_quietly(Channel::FileTransfer);
        }
        state.transfer_open = false;
    }

    fn close_quietly(&self, channel: Channel) {
        if let Err(err) = self.transport.disconnect(channel) {
            debug!(node = %self.name, channel = ?channel, error = %err, "ignoring teardown failure");
        }
    }

    fn open_with_retry(&self, channel: Channel, timeout: Duration) -> Result<(), NodeError> {
        // A timeout too large to represent means no deadline at all.
        let deadline = self.clock.now().checked_add(timeout);
        loop {
            match self.transport.connect(channel) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    if deadline.is_some_and(|limit| self.clock.now() >= limit) {
                        return Err(NodeError::Timeout {
                            node: self.name.clone(),
                            timeout_secs: timeout.as_secs(),
                            source: err,
                        });
                    }
                    debug!(
                        node = %self.name,
                        channel = ?channel,
                        error = %err,
                        "connection attempt failed; retrying"
                    );
                    self.clock.sleep(CONNECT_RETRY_INTERVAL);
                }
            }
        }
    }

    pub(crate) fn ensure_not_disposed(&self) -> Result<(), NodeError> {
        if self.state.lock().shell == ConnectionState::Disposed {
            return Err(self.disposed());
        }
        Ok(())
    }

    pub(crate) fn ensure_shell(&self) -> Result<(), NodeError> {
        self.connect()
    }

    pub(crate) fn ensure_transfer(&self) -> Result<(), NodeError> {
        let _gate = self.connect_gate.lock();
        {
            let state = self.state.lock();
            if state.shell == ConnectionState::Disposed {
                return Err(self.disposed());
            }
            if state.transfer_open {
                return Ok(());
            }
        }

        self.open_with_retry(Channel::FileTransfer, self.connect_timeout)?;
        let mut state = self.state.lock();
        if state.shell == ConnectionState::Disposed {
            self.close_quietly(Channel::FileTransfer);
            return Err(self.disposed());
        }
        state.transfer_open = true;
        Ok(())
    }

    pub(crate) fn mark_faulted(&self, status: String) {
        let mut state = self.state.lock();
        state.faulted = true;
        state.status = status;
    }

    pub(crate) fn upload_folder_ready(&self) -> bool {
        self.state.lock().upload_folder_ready
    }

    pub(crate) fn set_upload_folder_ready(&self) {
        self.state.lock().upload_folder_ready = true;
    }

    pub(crate) fn unique_name(&self) -> String {
        format!("{}-{:08x}", self.clock.timestamp(), Uuid::new_v4().as_fields().0)
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) const fn default_options(&self) -> RunOptions {
        self.default_options
    }

    fn disposed(&self) -> NodeError {
        NodeError::Disposed {
            node: self.name.clone(),
        }
    }

    pub(crate) fn log_info(&self, line: &str) {
        info!(node = %self.name, "{line}");
        self.write_log(line);
    }

    pub(crate) fn log_warn(&self, line: &str) {
        warn!(node = %self.name, "{line}");
        self.write_log(line);
    }

    fn write_log(&self, line: &str) {
        if let Some(writer) = self.log_writer.lock().as_mut() {
            writeln!(writer, "{line}").ok();
        }
    }
}

impl<M, T: SshTransport> Drop for NodeProxy<M, T> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        self.teardown(&mut state);
    }
}

impl<M: std::fmt::Debug, T: SshTransport> std::fmt::Debug for NodeProxy<M, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("NodeProxy")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("metadata", &self.metadata)
            .field("connection", &state.shell)
            .field("faulted", &state.faulted)
            .field("status", &state.status)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
