//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, VecDeque};
use std::io::{self, Write};
use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::Mutex;

use crate::clock::Clock;
use crate::transport::{Channel, RemoteOutput, SshTransport, TransportError};

const SUDO_SHIM: &str = "sudo() { \"$@\"; }";

/// One call made through [`ScriptedTransport`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TransportCall {
    /// A channel was opened.
    Connect(Channel),
    /// A channel was closed.
    Disconnect(Channel),
    /// A command was run.
    Run(String),
    /// A file was written.
    Upload {
        /// Remote destination.
        path: String,
        /// Bytes written.
        contents: Vec<u8>,
    },
    /// A file was read.
    Download(String),
}

#[derive(Debug, Default)]
struct ScriptState {
    runs: VecDeque<Result<RemoteOutput, TransportError>>,
    downloads: VecDeque<Result<Vec<u8>, TransportError>>,
    connect_failures: usize,
    files: BTreeMap<String, Vec<u8>>,
    calls: Vec<TransportCall>,
}

/// Scripted transport that replays queued outcomes in FIFO order and
/// records every call.
///
/// Unscripted runs succeed with empty output. Downloads fall back to files
/// previously uploaded to the same path. Clones share state, so a test can
/// keep a handle after moving one into a session.
#[derive(Clone, Debug, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    /// Creates a transport with nothing queued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the outcome of the next unscripted run.
    pub fn push_run(&self, output: RemoteOutput) {
        self.state.lock().runs.push_back(Ok(output));
    }

    /// Queues a transport failure for the next run.
    pub fn push_run_error(&self, error: TransportError) {
        self.state.lock().runs.push_back(Err(error));
    }

    /// Queues bytes for the next download.
    pub fn push_download(&self, contents: impl Into<Vec<u8>>) {
        self.state.lock().downloads.push_back(Ok(contents.into()));
    }

    /// Makes the next `count` connection attempts fail.
    pub fn fail_connects(&self, count: usize) {
        self.state.lock().connect_failures = count;
    }

    /// Snapshot of every call made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.lock().calls.clone()
    }

    /// Commands passed to `run`, in order.
    #[must_use]
    pub fn runs(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::Run(command) => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    /// Uploads made so far as `(path, contents)` pairs.
    #[must_use]
    pub fn uploads(&self) -> Vec<(String, Vec<u8>)> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::Upload { path, contents } => Some((path.clone(), contents.clone())),
                _ => None,
            })
            .collect()
    }

    /// Number of calls that reached the transport.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }
}

impl SshTransport for ScriptedTransport {
    fn connect(&self, channel: Channel) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.calls.push(TransportCall::Connect(channel));
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(TransportError::Connect {
                host: String::from("scripted"),
                message: String::from("connection refused"),
            });
        }
        Ok(())
    }

    fn disconnect(&self, channel: Channel) -> Result<(), TransportError> {
        self.state.lock().calls.push(TransportCall::Disconnect(channel));
        Ok(())
    }

    fn run(&self, command: &str) -> Result<RemoteOutput, TransportError> {
        let mut state = self.state.lock();
        state.calls.push(TransportCall::Run(command.to_owned()));
        state
            .runs
            .pop_front()
            .unwrap_or_else(|| Ok(RemoteOutput::success("")))
    }

    fn upload(&self, contents: &[u8], remote_path: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.calls.push(TransportCall::Upload {
            path: remote_path.to_owned(),
            contents: contents.to_vec(),
        });
        state.files.insert(remote_path.to_owned(), contents.to_vec());
        Ok(())
    }

    fn download(&self, remote_path: &str) -> Result<Vec<u8>, TransportError> {
        let mut state = self.state.lock();
        state.calls.push(TransportCall::Download(remote_path.to_owned()));
        if let Some(next) = state.downloads.pop_front() {
            return next;
        }
        state
            .files
            .get(remote_path)
            .cloned()
            .ok_or_else(|| TransportError::Transfer {
                path: remote_path.to_owned(),
                message: String::from("no such file"),
            })
    }
}

/// Transport that runs commands with the local `sh` inside `root` and maps
/// relative remote paths under it.
///
/// `sudo` is shadowed by a shell function that runs its arguments
/// unprivileged, so elevated paths work without a password prompt.
#[derive(Clone, Debug)]
pub struct LocalShellTransport {
    root: Utf8PathBuf,
}

impl LocalShellTransport {
    /// Creates a transport rooted at `root`, which acts as the login home.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, remote_path: &str) -> Utf8PathBuf {
        let path = Utf8Path::new(remote_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl SshTransport for LocalShellTransport {
    fn connect(&self, _channel: Channel) -> Result<(), TransportError> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(TransportError::Connect {
                host: String::from("localhost"),
                message: format!("{} is not a directory", self.root),
            })
        }
    }

    fn disconnect(&self, _channel: Channel) -> Result<(), TransportError> {
        Ok(())
    }

    fn run(&self, command: &str) -> Result<RemoteOutput, TransportError> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(format!("{SUDO_SHIM}\n{command}"))
            .current_dir(&self.root)
            .output()
            .map_err(|err| TransportError::Spawn {
                program: String::from("sh"),
                message: err.to_string(),
            })?;
        let exit_code = output.status.code().ok_or_else(|| TransportError::Terminated {
            program: String::from("sh"),
        })?;
        Ok(RemoteOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn upload(&self, contents: &[u8], remote_path: &str) -> Result<(), TransportError> {
        let target = self.resolve(remote_path);
        let transfer_error = |err: io::Error| TransportError::Transfer {
            path: remote_path.to_owned(),
            message: err.to_string(),
        };
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(transfer_error)?;
        }
        std::fs::write(&target, contents).map_err(transfer_error)
    }

    fn download(&self, remote_path: &str) -> Result<Vec<u8>, TransportError> {
        std::fs::read(self.resolve(remote_path)).map_err(|err| TransportError::Transfer {
            path: remote_path.to_owned(),
            message: err.to_string(),
        })
    }
}

#[derive(Debug, Default)]
struct FakeClockState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

/// Clock whose sleeps return immediately and advance virtual time.
#[derive(Clone, Debug)]
pub struct FakeClock {
    origin: Instant,
    state: Arc<Mutex<FakeClockState>>,
}

impl FakeClock {
    /// Creates a clock at virtual time zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Arc::new(Mutex::new(FakeClockState::default())),
        }
    }

    /// Every requested sleep, in order.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().sleeps.clone()
    }

    /// Virtual time elapsed since creation.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.origin + self.state.lock().elapsed
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.state.lock();
        state.elapsed += duration;
        state.sleeps.push(duration);
    }
}

/// In-memory log sink whose clones share one buffer.
#[derive(Clone, Debug, Default)]
pub struct SharedLog {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl SharedLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    /// Written lines, without terminators.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }
}

impl Write for SharedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
