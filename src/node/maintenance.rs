//! Host maintenance operations built on the command path: docker retries,
//! certificate checks, folder preparation, and reboots.

use std::time::Duration;

use tracing::debug;

use crate::command_line::CommandArg;
use crate::layout;
use crate::response::CommandResponse;
use crate::run_options::RunOptions;
use crate::transport::SshTransport;

use super::exec::{Invocation, STEP_OPTIONS};
use super::{NodeError, NodeProxy};

/// Maximum number of attempts made by [`NodeProxy::docker_command`].
pub const DOCKER_ATTEMPTS: u32 = 10;

/// Fixed delay between docker attempts.
pub const DOCKER_RETRY_DELAY: Duration = Duration::from_secs(15);

/// Remote path receiving the leaf certificate during verification.
pub const CERT_LEAF_PATH: &str = "/tmp/neon-cert.crt";

/// Remote path receiving the CA chain during verification.
pub const CERT_CA_PATH: &str = "/tmp/neon-cert.ca";

const TRANSIENT_DOCKER_MARKERS: [&str; 2] = ["i/o timeout", "Client.Timeout exceeded"];
const CERT_END_MARKER: &str = "-----END CERTIFICATE-----";
const REBOOT_SETTLE_DELAY: Duration = Duration::from_secs(10);

impl<M, T: SshTransport> NodeProxy<M, T> {
    /// Runs a docker command under sudo, retrying transient network
    /// failures.
    ///
    /// Attempts whose error text mentions a network timeout are repeated up
    /// to [`DOCKER_ATTEMPTS`] times, [`DOCKER_RETRY_DELAY`] apart. Any other
    /// failure, or running out of attempts, faults the session. The last
    /// response is returned either way.
    ///
    /// # Errors
    ///
    /// Same as [`NodeProxy::sudo_command`].
    pub fn docker_command(
        &self,
        command: &str,
        args: &[CommandArg],
        options: RunOptions,
    ) -> Result<CommandResponse, NodeError> {
        let attempt_options = options
            .resolve(self.default_options())
            .without(RunOptions::FAULT_ON_NON_ZERO_EXIT);

        let mut attempt = 1;
        loop {
            let response = self.sudo_command(command, args, attempt_options)?;
            if response.is_success() || response.session_was_faulted() {
                return Ok(response);
            }

            let transient = response
                .error_text()
                .is_some_and(|text| TRANSIENT_DOCKER_MARKERS.iter().any(|marker| text.contains(marker)));
            if !transient {
                self.fault(&format!("docker exited with code {}", response.exit_code()));
                return Ok(response);
            }
            if attempt >= DOCKER_ATTEMPTS {
                self.fault(&format!("docker still timing out after {attempt} attempts"));
                return Ok(response);
            }

            debug!(node = %self.name(), attempt, "transient docker failure; retrying");
            self.clock().sleep(DOCKER_RETRY_DELAY);
            attempt += 1;
        }
    }

    /// Checks a PEM bundle on the host with `openssl verify`.
    ///
    /// The bundle is split after its first certificate: that part is the
    /// leaf and the remainder is the CA chain (the leaf itself when nothing
    /// follows). Both temporary files are removed whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Certificate`] when `pem` holds no certificate,
    /// [`NodeError::InvalidArgument`] for an empty hostname, and propagates
    /// upload and execution errors.
    pub fn verify_certificate(&self, pem: &str, hostname: &str) -> Result<CommandResponse, NodeError> {
        if hostname.trim().is_empty() {
            return Err(NodeError::InvalidArgument(String::from(
                "certificate hostname is empty",
            )));
        }
        let (leaf, chain) = split_certificate(pem)?;

        let result = self.run_verification(leaf, chain, hostname);
        self.remove_certificate_files();
        result
    }

    fn run_verification(&self, leaf: &str, chain: &str, hostname: &str) -> Result<CommandResponse, NodeError> {
        self.upload_text(CERT_LEAF_PATH, leaf, 0, true)?;
        self.upload_text(CERT_CA_PATH, chain, 0, true)?;
        self.sudo_command(
            "openssl verify",
            &[
                "-CAfile".into(),
                CERT_CA_PATH.into(),
                "-verify_hostname".into(),
                hostname.into(),
                CERT_LEAF_PATH.into(),
            ],
            RunOptions::NONE,
        )
    }

    fn remove_certificate_files(&self) {
        let removal = self.execute(&Invocation {
            command_line: &format!("rm -f {CERT_LEAF_PATH} {CERT_CA_PATH}"),
            display: None,
            options: STEP_OPTIONS,
            elevated: true,
        });
        match removal {
            Ok(response) if !response.is_success() => {
                self.log_warn(&format!(
                    "could not remove certificate files: exit code {}",
                    response.exit_code()
                ));
            }
            Err(err) => self.log_warn(&format!("could not remove certificate files: {err}")),
            Ok(_) => {}
        }
    }

    /// Creates the standard host folders with their modes in one sudo
    /// command. A failure faults the session.
    ///
    /// # Errors
    ///
    /// Same as [`NodeProxy::sudo_command`].
    pub fn prepare_host_folders(&self) -> Result<CommandResponse, NodeError> {
        self.sudo_command(
            &layout::prepare_folders_command(),
            &[],
            RunOptions::FAULT_ON_NON_ZERO_EXIT,
        )
    }

    /// Reboots the host and optionally waits for it to come back.
    ///
    /// The reboot command itself is best-effort: the host commonly drops
    /// the connection before reporting an exit status.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Timeout`] when `wait` is set and the host does
    /// not return before the connection deadline.
    pub fn reboot(&self, wait: bool) -> Result<(), NodeError> {
        self.log_info("REBOOT");
        if let Err(err) = self.execute(&Invocation {
            command_line: "reboot",
            display: None,
            options: STEP_OPTIONS,
            elevated: true,
        }) {
            debug!(node = %self.name(), error = %err, "reboot dropped the connection");
        }
        self.disconnect();

        if !wait {
            return Ok(());
        }
        self.clock().sleep(REBOOT_SETTLE_DELAY);
        self.wait_for_boot(self.connect_timeout())
    }
}

fn split_certificate(pem: &str) -> Result<(&str, &str), NodeError> {
    let end = pem
        .find(CERT_END_MARKER)
        .ok_or_else(|| NodeError::Certificate(String::from("no END CERTIFICATE boundary found")))?;
    let split = end + CERT_END_MARKER.len();
    let leaf = pem.get(..split).unwrap_or(pem);
    let chain = pem.get(split..).unwrap_or_default().trim();
    if chain.is_empty() {
        Ok((leaf, leaf))
    } else {
        Ok((leaf, chain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEAF: &str = "-----BEGIN CERTIFICATE-----\nLEAF\n-----END CERTIFICATE-----";
    const CA: &str = "-----BEGIN CERTIFICATE-----\nCA\n-----END CERTIFICATE-----";

    #[test]
    fn split_separates_leaf_from_chain() {
        let pem = format!("{LEAF}\n{CA}\n");
        let (leaf, chain) = split_certificate(&pem).expect("split");
        assert_eq!(leaf, LEAF);
        assert_eq!(chain, CA);
    }

    #[test]
    fn split_reuses_leaf_without_chain() {
        let (leaf, chain) = split_certificate(LEAF).expect("split");
        assert_eq!(leaf, chain);
    }

    #[test]
    fn split_rejects_bundle_without_certificate() {
        let err = split_certificate("not a certificate").expect_err("must fail");
        assert!(matches!(err, NodeError::Certificate(_)));
    }
}
