//! Plain and elevated command execution.

use crate::command_line::{self, CommandArg, REDACTED};
use crate::response::CommandResponse;
use crate::run_options::RunOptions;
use crate::transport::SshTransport;

use super::{NodeError, NodeProxy};

/// Options used for internal protocol steps: quiet unless they fail, and
/// never skipped by the fault guard.
pub(crate) const STEP_OPTIONS: RunOptions = RunOptions::LOG_ONLY_ON_ERROR
    .union(RunOptions::RUN_EVEN_IF_FAULTED);

/// A command ready for execution.
pub(crate) struct Invocation<'a> {
    /// Rendered command line, without any wrapper.
    pub(crate) command_line: &'a str,
    /// What the log should cite instead of `command_line`, if anything.
    pub(crate) display: Option<&'a str>,
    pub(crate) options: RunOptions,
    pub(crate) elevated: bool,
}

impl<M, T: SshTransport> NodeProxy<M, T> {
    /// Runs `command` with `args` as the login user.
    ///
    /// A non-zero exit code is reported in the response, not as an error.
    /// While the session is faulted the call returns a synthetic failure
    /// without touching the host unless
    /// [`RunOptions::RUN_EVEN_IF_FAULTED`] is set.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Disposed`] for a disposed session and
    /// propagates transport failures unchanged.
    pub fn run_command(
        &self,
        command: &str,
        args: &[CommandArg],
        options: RunOptions,
    ) -> Result<CommandResponse, NodeError> {
        let line = command_line::render(command, args);
        self.execute(&Invocation {
            command_line: &line,
            display: None,
            options,
            elevated: false,
        })
    }

    /// Runs `command` with `args` under `sudo bash -c '...'`.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::QuoteInSudoCommand`] before any network call
    /// when the rendered command contains a single quote, or
    /// [`NodeError::QuoteInRemotePath`] when the exported `PATH` does, plus
    /// every error
    /// [`NodeProxy::run_command`] can return.
    pub fn sudo_command(
        &self,
        command: &str,
        args: &[CommandArg],
        options: RunOptions,
    ) -> Result<CommandResponse, NodeError> {
        let line = command_line::render(command, args);
        self.execute(&Invocation {
            command_line: &line,
            display: None,
            options,
            elevated: true,
        })
    }

    pub(crate) fn execute(&self, invocation: &Invocation<'_>) -> Result<CommandResponse, NodeError> {
        self.ensure_not_disposed()?;
        let options = invocation.options.resolve(self.default_options());
        let classified = options.contains(RunOptions::CLASSIFIED);
        let shown = invocation.display.unwrap_or(invocation.command_line);
        let logged = if classified {
            command_line::redact(shown)
        } else {
            shown.to_owned()
        };

        if invocation.elevated && invocation.command_line.contains('\'') {
            return Err(NodeError::QuoteInSudoCommand { command: logged });
        }
        if invocation.elevated && self.exports_path(options) && self.remote_path().contains('\'') {
            return Err(NodeError::QuoteInRemotePath {
                node: self.name().to_owned(),
                remote_path: self.remote_path().to_owned(),
            });
        }

        if self.is_faulted() && !options.contains(RunOptions::RUN_EVEN_IF_FAULTED) {
            return Ok(CommandResponse::rejected_faulted(invocation.command_line));
        }

        let quiet_start = options.contains(RunOptions::LOG_ONLY_ON_ERROR);
        let start_logged = if options.contains(RunOptions::SUPPRESS_START_LINE) {
            !quiet_start
        } else if quiet_start {
            false
        } else {
            self.log_info(&format!("START: {logged}"));
            true
        };

        let binary_path = options
            .contains(RunOptions::BINARY_OUTPUT)
            .then(|| format!("/tmp/neon-{}.out", self.unique_name()));
        let remote = self.wrap_command(
            invocation.command_line,
            options,
            invocation.elevated,
            binary_path.as_deref(),
        );

        self.ensure_shell()?;
        let output = self.transport().run(&remote)?;

        let response = match binary_path {
            Some(path) => {
                let bytes = self.collect_binary_output(&path, invocation.elevated)?;
                CommandResponse::binary(remote, output.exit_code, bytes, output.stderr)
            }
            None => CommandResponse::text(remote, output.exit_code, output.stdout, output.stderr),
        };

        self.record_outcome(&response, options, &logged, start_logged);
        Ok(response)
    }

    /// Builds the string handed to the transport: optional `PATH` export,
    /// optional stdout redirect, optional sudo wrapper.
    pub(crate) fn wrap_command(
        &self,
        command_line: &str,
        options: RunOptions,
        elevated: bool,
        binary_path: Option<&str>,
    ) -> String {
        let mut body = command_line.to_owned();
        if let Some(path) = binary_path {
            body = format!("{body} > {path}");
        }
        if self.exports_path(options) {
            body = format!("export PATH={} && {body}", self.remote_path());
        }
        if elevated {
            format!("sudo bash -c '{body}'")
        } else {
            body
        }
    }

    fn exports_path(&self, options: RunOptions) -> bool {
        !options.contains(RunOptions::IGNORE_CONFIGURED_PATH) && !self.remote_path().is_empty()
    }

    fn collect_binary_output(&self, path: &str, elevated: bool) -> Result<Vec<u8>, NodeError> {
        self.ensure_transfer()?;
        let downloaded = self.transport().download(path);
        let remove = if elevated {
            format!("sudo rm -f {path}")
        } else {
            format!("rm -f {path}")
        };
        match self.transport().run(&remove) {
            Ok(output) if output.exit_code != 0 => {
                self.log_warn(&format!("could not remove {path}: {}", output.stderr.trim()));
            }
            Err(err) => self.log_warn(&format!("could not remove {path}: {err}")),
            Ok(_) => {}
        }
        Ok(downloaded?)
    }

    fn record_outcome(
        &self,
        response: &CommandResponse,
        options: RunOptions,
        logged: &str,
        start_logged: bool,
    ) {
        let classified = options.contains(RunOptions::CLASSIFIED);
        let exit_code = response.exit_code();

        if exit_code == 0 {
            let log_output = options.contains(RunOptions::LOG_OUTPUT);
            if options.contains(RunOptions::LOG_ONLY_ON_ERROR) && !log_output {
                return;
            }
            if !start_logged {
                self.log_info(&format!("START: {logged}"));
            }
            if log_output {
                self.log_stream("STDOUT", stdout_for_log(response).as_deref(), classified);
            }
            self.log_info("END [OK]");
            return;
        }

        if !start_logged {
            self.log_info(&format!("START: {logged}"));
        }
        self.log_stream("STDOUT", stdout_for_log(response).as_deref(), classified);
        self.log_stream("STDERR", response.error_text(), classified);
        self.log_warn(&format!("END [ERROR={exit_code}]"));

        if options.contains(RunOptions::FAULT_ON_NON_ZERO_EXIT) {
            self.mark_faulted(format!("ERROR[{exit_code}]"));
        } else {
            self.set_status(format!("WARN[{exit_code}]"));
        }
    }

    fn log_stream(&self, label: &str, text: Option<&str>, classified: bool) {
        let Some(body) = text.filter(|body| !body.trim().is_empty()) else {
            return;
        };
        self.log_info(&format!("{label}:"));
        if classified {
            self.log_info(&format!("    {REDACTED}"));
            return;
        }
        for line in body.lines() {
            self.log_info(&format!("    {line}"));
        }
    }
}

fn stdout_for_log(response: &CommandResponse) -> Option<String> {
    response.output_binary().map_or_else(
        || response.output_text().map(str::to_owned),
        |bytes| Some(format!("[{} bytes of binary output]", bytes.len())),
    )
}
