//! Command-line interface definitions for the `neon` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser};

/// Top-level CLI for the `neon` binary.
#[derive(Debug, Parser)]
#[command(
    name = "neon",
    about = "Run commands and move files on a managed cluster node over SSH",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Run a command as the login user.
    #[command(name = "run", about = "Run a command as the login user")]
    Run(ExecCommand),
    /// Run a command under sudo.
    #[command(name = "sudo", about = "Run a command under sudo")]
    Sudo(ExecCommand),
    /// Copy a local file to the node.
    #[command(name = "upload", about = "Copy a local file to the node")]
    Upload(UploadCommand),
    /// Copy a file from the node.
    #[command(name = "download", about = "Copy a file from the node")]
    Download(DownloadCommand),
}

/// Node selection shared by every subcommand.
#[derive(Debug, Args)]
pub(crate) struct TargetArgs {
    /// Address or host name of the node.
    #[arg(long, value_name = "ADDRESS", env = "NEON_HOST")]
    pub(crate) host: String,
    /// Display name used in logs; defaults to the address.
    #[arg(long, value_name = "NAME")]
    pub(crate) name: Option<String>,
}

/// Arguments for `neon run` and `neon sudo`.
#[derive(Debug, Args)]
pub(crate) struct ExecCommand {
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    /// Redact arguments and output in logs.
    #[arg(long)]
    pub(crate) classified: bool,
    /// Do not export the configured remote `PATH`.
    #[arg(long)]
    pub(crate) ignore_path: bool,
    /// Command to execute on the node (use -- to separate flags).
    #[arg(required = true, trailing_var_arg = true)]
    pub(crate) command: Vec<String>,
}

/// Arguments for `neon upload`.
#[derive(Debug, Args)]
pub(crate) struct UploadCommand {
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    /// Move the file into place with sudo.
    #[arg(long)]
    pub(crate) as_root: bool,
    /// Treat the file as text: normalise line endings and drop a BOM.
    #[arg(long)]
    pub(crate) text: bool,
    /// Expand tabs to this stop width (text uploads only; 0 keeps tabs).
    #[arg(long, value_name = "WIDTH", default_value_t = 0, requires = "text")]
    pub(crate) tab_stop: usize,
    /// Local file to send.
    #[arg(value_name = "LOCAL")]
    pub(crate) local: String,
    /// Remote destination path.
    #[arg(value_name = "REMOTE")]
    pub(crate) remote: String,
}

/// Arguments for `neon download`.
#[derive(Debug, Args)]
pub(crate) struct DownloadCommand {
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    /// Remote file to fetch.
    #[arg(value_name = "REMOTE")]
    pub(crate) remote: String,
    /// Local destination; missing parent folders are created.
    #[arg(value_name = "LOCAL")]
    pub(crate) local: String,
}
