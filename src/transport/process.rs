//! Transport backed by the system `ssh` and `scp` clients.

use std::ffi::OsString;
use std::io::Write;
use std::process::{Command, Output};

use tempfile::{NamedTempFile, TempDir};

use crate::config::NodeConfig;

use super::{Channel, RemoteOutput, SshTransport, TransportError, expand_tilde};

const CONNECT_TIMEOUT_SECS: u32 = 10;

/// Exit status `ssh` reserves for its own failures.
const SSH_CLIENT_FAILURE: i32 = 255;

/// Runs remote commands by spawning `ssh` and copies files with `scp`.
///
/// OpenSSH clients hold no state between invocations, so opening a channel
/// performs a reachability check and closing one is a no-op.
#[derive(Clone, Debug)]
pub struct ProcessTransport {
    config: NodeConfig,
    host: String,
}

impl ProcessTransport {
    /// Creates a transport for `host` using the given settings.
    #[must_use]
    pub fn new(config: NodeConfig, host: impl Into<String>) -> Self {
        Self {
            config,
            host: host.into(),
        }
    }

    /// Host this transport targets.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.config.ssh_user, self.host)
    }

    fn common_options(&self) -> Vec<OsString> {
        let mut args = Vec::new();

        if let Some(ref identity_file) = self.config.ssh_identity_file {
            args.push(OsString::from("-i"));
            args.push(OsString::from(expand_tilde(identity_file)));
        }

        if self.config.ssh_batch_mode {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.config.ssh_strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.config.ssh_known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.config.ssh_known_hosts_file
            )));
        }

        args.push(OsString::from("-o"));
        args.push(OsString::from(format!("ConnectTimeout={CONNECT_TIMEOUT_SECS}")));
        args
    }

    pub(crate) fn ssh_args(&self, remote_command: &str) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-p"),
            OsString::from(self.config.ssh_port.to_string()),
        ];
        args.extend(self.common_options());
        args.push(OsString::from(self.destination()));
        args.push(OsString::from(remote_command));
        args
    }

    pub(crate) fn scp_args(&self, from: OsString, to: OsString) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-q"),
            OsString::from("-P"),
            OsString::from(self.config.ssh_port.to_string()),
        ];
        args.extend(self.common_options());
        args.push(from);
        args.push(to);
        args
    }

    fn remote_target(&self, remote_path: &str) -> OsString {
        OsString::from(format!("{}:{remote_path}", self.destination()))
    }

    fn spawn(program: &str, args: &[OsString]) -> Result<Output, TransportError> {
        Command::new(program)
            .args(args)
            .output()
            .map_err(|err| TransportError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })
    }

    fn copy(&self, from: OsString, to: OsString, remote_path: &str) -> Result<(), TransportError> {
        let output = Self::spawn(&self.config.scp_bin, &self.scp_args(from, to))?;
        if output.status.success() {
            return Ok(());
        }
        Err(TransportError::Transfer {
            path: remote_path.to_owned(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        })
    }
}

impl SshTransport for ProcessTransport {
    fn connect(&self, channel: Channel) -> Result<(), TransportError> {
        let output = self.run("true")?;
        if output.exit_code == 0 {
            return Ok(());
        }
        Err(TransportError::Connect {
            host: self.host.clone(),
            message: format!(
                "{channel:?} check exited with {}: {}",
                output.exit_code,
                output.stderr.trim()
            ),
        })
    }

    fn disconnect(&self, _channel: Channel) -> Result<(), TransportError> {
        Ok(())
    }

    fn run(&self, command: &str) -> Result<RemoteOutput, TransportError> {
        let output = Self::spawn(&self.config.ssh_bin, &self.ssh_args(command))?;
        let exit_code = output.status.code().ok_or_else(|| TransportError::Terminated {
            program: self.config.ssh_bin.clone(),
        })?;
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if exit_code == SSH_CLIENT_FAILURE && stderr.contains("ssh:") {
            return Err(TransportError::Connect {
                host: self.host.clone(),
                message: stderr.trim().to_owned(),
            });
        }
        Ok(RemoteOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
        })
    }

    fn upload(&self, contents: &[u8], remote_path: &str) -> Result<(), TransportError> {
        let local_error = |err: std::io::Error| TransportError::Transfer {
            path: remote_path.to_owned(),
            message: err.to_string(),
        };
        let mut staged = NamedTempFile::new().map_err(local_error)?;
        staged.write_all(contents).map_err(local_error)?;
        staged.flush().map_err(local_error)?;

        self.copy(
            staged.path().as_os_str().to_owned(),
            self.remote_target(remote_path),
            remote_path,
        )
    }

    fn download(&self, remote_path: &str) -> Result<Vec<u8>, TransportError> {
        let local_error = |err: std::io::Error| TransportError::Transfer {
            path: remote_path.to_owned(),
            message: err.to_string(),
        };
        let scratch = TempDir::new().map_err(local_error)?;
        let target = scratch.path().join("download");

        self.copy(
            self.remote_target(remote_path),
            target.as_os_str().to_owned(),
            remote_path,
        )?;
        std::fs::read(&target).map_err(local_error)
    }
}
