//! Node connection settings loaded via `ortho-config`.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default value exported as `PATH` before each remote command.
pub const DEFAULT_REMOTE_PATH: &str = "$PATH:/lib/neon/tools";

/// Default deadline for connection attempts, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 300;

/// SSH and session settings derived from defaults, configuration files,
/// and environment variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "NEON",
    discovery(
        app_name = "neon",
        env_var = "NEON_CONFIG_PATH",
        config_file_name = "neon.toml",
        dotfile_name = ".neon.toml",
        project_file_name = "neon.toml"
    )
)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "configuration struct with user-facing toggle settings that are naturally expressed as booleans"
)]
pub struct NodeConfig {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `scp` executable.
    #[ortho_config(default = "scp".to_owned())]
    pub scp_bin: String,
    /// Remote user to connect as.
    #[ortho_config(default = "sysadmin".to_owned())]
    pub ssh_user: String,
    /// TCP port of the SSH daemon.
    #[ortho_config(default = 22)]
    pub ssh_port: u16,
    /// Private key used for authentication. Supports tilde expansion. When
    /// unset, `ssh` falls back to its default key locations.
    pub ssh_identity_file: Option<String>,
    /// Whether to force batch mode so `ssh` never prompts.
    #[ortho_config(default = true)]
    pub ssh_batch_mode: bool,
    /// Whether to enforce host key checking.
    #[ortho_config(default = false)]
    pub ssh_strict_host_key_checking: bool,
    /// Known hosts file override.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub ssh_known_hosts_file: String,
    /// Deadline for connection attempts in seconds; zero means one attempt.
    #[ortho_config(default = DEFAULT_CONNECT_TIMEOUT_SECS)]
    pub connect_timeout_secs: u64,
    /// Value exported as `PATH` before each remote command.
    #[ortho_config(default = DEFAULT_REMOTE_PATH.to_owned())]
    pub remote_path: String,
}

impl NodeConfig {
    /// Returns the built-in defaults without consulting any source.
    #[must_use]
    pub fn built_in() -> Self {
        Self {
            ssh_bin: String::from("ssh"),
            scp_bin: String::from("scp"),
            ssh_user: String::from("sysadmin"),
            ssh_port: 22,
            ssh_identity_file: None,
            ssh_batch_mode: true,
            ssh_strict_host_key_checking: false,
            ssh_known_hosts_file: String::from("/dev/null"),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            remote_path: String::from(DEFAULT_REMOTE_PATH),
        }
    }
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(env_var: &'static str, toml_key: &'static str) -> Self {
        Self { env_var, toml_key }
    }
}

impl NodeConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("neon")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Connection deadline as a [`Duration`].
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Ensures required values are present after trimming whitespace and
    /// that `remote_path` can be embedded in a single-quoted `sudo` wrapper.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the environment variable
    /// and TOML key that supply the missing value, or
    /// [`ConfigError::Invalid`] for a `remote_path` containing `'`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(&self.ssh_bin, &FieldMetadata::new("NEON_SSH_BIN", "ssh_bin"))?;
        Self::require_field(&self.scp_bin, &FieldMetadata::new("NEON_SCP_BIN", "scp_bin"))?;
        Self::require_field(
            &self.ssh_user,
            &FieldMetadata::new("NEON_SSH_USER", "ssh_user"),
        )?;
        if let Some(identity) = &self.ssh_identity_file {
            Self::require_field(
                identity,
                &FieldMetadata::new("NEON_SSH_IDENTITY_FILE", "ssh_identity_file"),
            )?;
        }
        if self.ssh_port == 0 {
            return Err(ConfigError::MissingField(String::from(
                "ssh_port must be non-zero: set NEON_SSH_PORT or add ssh_port to neon.toml",
            )));
        }
        if self.remote_path.contains('\'') {
            return Err(ConfigError::Invalid(String::from(
                "remote_path must not contain single quotes: fix NEON_REMOTE_PATH or remote_path in neon.toml",
            )));
        }
        Ok(())
    }

    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to neon.toml",
                metadata.toml_key, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds a value that cannot be used.
    #[error("invalid configuration value: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
