//! Command-bundle transfer, unpacking, execution, and cleanup.

use crate::bundle::{CommandBundle, LAUNCHER_NAME, SUDO_EXEC_MODE, USER_EXEC_MODE};
use crate::command_line;
use crate::response::CommandResponse;
use crate::run_options::RunOptions;
use crate::transport::SshTransport;

use super::exec::{Invocation, STEP_OPTIONS};
use super::{NodeError, NodeProxy};

const ARCHIVE_NAME: &str = "__bundle.zip";

impl<M, T: SshTransport> NodeProxy<M, T> {
    /// Ships `bundle` to the host and runs its entry command as the login
    /// user from the extraction folder.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Bundle`] for an invalid bundle,
    /// [`NodeError::Step`] when creating or unpacking the extraction folder
    /// fails, and propagates transport failures.
    pub fn run_bundle(
        &self,
        bundle: &CommandBundle,
        options: RunOptions,
    ) -> Result<CommandResponse, NodeError> {
        self.execute_bundle(bundle, options, false)
    }

    /// Ships `bundle` to the host and runs its entry command under sudo.
    ///
    /// Unlike [`NodeProxy::sudo_command`], the bundled command may contain
    /// single quotes because it travels inside the launcher script.
    ///
    /// # Errors
    ///
    /// Same as [`NodeProxy::run_bundle`].
    pub fn sudo_bundle(
        &self,
        bundle: &CommandBundle,
        options: RunOptions,
    ) -> Result<CommandResponse, NodeError> {
        self.execute_bundle(bundle, options, true)
    }

    fn execute_bundle(
        &self,
        bundle: &CommandBundle,
        options: RunOptions,
        elevated: bool,
    ) -> Result<CommandResponse, NodeError> {
        self.ensure_not_disposed()?;
        bundle.validate()?;
        let resolved = options.resolve(self.default_options());
        let display = bundle.command_line();

        if self.is_faulted() && !resolved.contains(RunOptions::RUN_EVEN_IF_FAULTED) {
            return Ok(CommandResponse::rejected_faulted(display));
        }

        if !resolved.contains(RunOptions::LOG_ONLY_ON_ERROR) {
            let logged = if resolved.contains(RunOptions::CLASSIFIED) {
                command_line::redact(&display)
            } else {
                display.clone()
            };
            self.log_info(&format!("START: {logged}"));
        }

        let exec_mode = if elevated { SUDO_EXEC_MODE } else { USER_EXEC_MODE };
        let archive = bundle.package(exec_mode)?;
        let folder = format!("{}/{}", self.exec_root(), self.unique_name());

        let result = self.deploy_and_run(&folder, &archive, &display, resolved, elevated);
        self.remove_bundle_folder(&folder);
        result
    }

    fn deploy_and_run(
        &self,
        folder: &str,
        archive: &[u8],
        display: &str,
        options: RunOptions,
        elevated: bool,
    ) -> Result<CommandResponse, NodeError> {
        self.step(
            &format!("mkdir -p {folder} && chmod 777 {folder}"),
            true,
            "create bundle folder",
        )?;

        self.ensure_transfer()?;
        self.transport()
            .upload(archive, &format!("{folder}/{ARCHIVE_NAME}"))?;

        self.step(
            &format!(
                "cd {folder} && unzip -o -q {ARCHIVE_NAME} && rm {ARCHIVE_NAME} && chmod 700 {LAUNCHER_NAME}"
            ),
            elevated,
            "unpack bundle",
        )?;

        let launch = if elevated {
            format!("cd {folder} && /bin/bash ./{LAUNCHER_NAME}")
        } else {
            format!("cd {folder} && ./{LAUNCHER_NAME}")
        };
        self.execute(&Invocation {
            command_line: &launch,
            display: Some(display),
            options: options | RunOptions::SUPPRESS_START_LINE,
            elevated,
        })
    }

    fn remove_bundle_folder(&self, folder: &str) {
        let removal = self.execute(&Invocation {
            command_line: &format!("rm -rf {folder}"),
            display: None,
            options: STEP_OPTIONS,
            elevated: true,
        });
        match removal {
            Ok(response) if !response.is_success() => self.log_warn(&format!(
                "could not remove bundle folder {folder}: exit code {}",
                response.exit_code()
            )),
            Err(err) => self.log_warn(&format!("could not remove bundle folder {folder}: {err}")),
            Ok(_) => {}
        }
    }

    /// Runs an internal protocol step, turning a non-zero exit into
    /// [`NodeError::Step`].
    pub(crate) fn step(&self, command: &str, elevated: bool, step: &str) -> Result<(), NodeError> {
        let response = self.execute(&Invocation {
            command_line: command,
            display: None,
            options: STEP_OPTIONS,
            elevated,
        })?;
        if response.is_success() {
            return Ok(());
        }
        Err(NodeError::Step {
            node: self.name().to_owned(),
            step: step.to_owned(),
            exit_code: response.exit_code(),
            message: response.all_text().trim().to_owned(),
        })
    }
}
