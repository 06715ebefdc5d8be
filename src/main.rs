//! Binary entry point for the `neon` CLI.

use std::env;
use std::io::{self, Write};
use std::process;

use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use neon::{CommandArg, CommandResponse, NodeConfig, NodeError, NodeProxy, RunOptions};

mod cli;
#[cfg(test)]
mod test_helpers;

use cli::{Cli, DownloadCommand, ExecCommand, TargetArgs, UploadCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("cannot read {path}: {message}")]
    LocalFile { path: String, message: String },
    #[error("invalid command argument: {0}")]
    InvalidCommand(String),
    #[error(transparent)]
    Node(#[from] NodeError),
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli) {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn dispatch(cli: Cli) -> Result<i32, CliError> {
    if let Some(result) = fake_run_from_env() {
        return result;
    }

    match cli {
        Cli::Run(command) => exec(&command, false),
        Cli::Sudo(command) => exec(&command, true),
        Cli::Upload(command) => upload(&command),
        Cli::Download(command) => download(&command),
    }
}

fn open_node(target: &TargetArgs) -> Result<NodeProxy<()>, CliError> {
    let config =
        NodeConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    config
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;
    let name = target.name.clone().unwrap_or_else(|| target.host.clone());
    Ok(NodeProxy::from_config(name, target.host.clone(), (), &config))
}

fn exec(command: &ExecCommand, elevated: bool) -> Result<i32, CliError> {
    validate_command_args(&command.command)?;
    let (verb, args) = split_command(&command.command)?;
    let node = open_node(&command.target)?;
    let options = exec_options(command);

    let response = if elevated {
        node.sudo_command(verb, &args, options)?
    } else {
        node.run_command(verb, &args, options)?
    };
    write_streams(io::stdout(), io::stderr(), &response);
    Ok(response.exit_code())
}

fn upload(command: &UploadCommand) -> Result<i32, CliError> {
    let contents = read_local(Utf8Path::new(&command.local))?;
    let node = open_node(&command.target)?;

    if command.text {
        let text = String::from_utf8(contents).map_err(|err| CliError::LocalFile {
            path: command.local.clone(),
            message: err.to_string(),
        })?;
        node.upload_text(&command.remote, &text, command.tab_stop, command.as_root)?;
    } else {
        node.upload(&command.remote, &contents, command.as_root)?;
    }
    Ok(0)
}

fn download(command: &DownloadCommand) -> Result<i32, CliError> {
    let node = open_node(&command.target)?;
    node.download_to(&command.remote, Utf8Path::new(&command.local))?;
    Ok(0)
}

fn read_local(path: &Utf8Path) -> Result<Vec<u8>, CliError> {
    let local_error = |message: String| CliError::LocalFile {
        path: path.to_string(),
        message,
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| local_error(String::from("not a file path")))?;
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));

    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|err| local_error(err.to_string()))?;
    dir.read(file_name).map_err(|err| local_error(err.to_string()))
}

fn split_command(words: &[String]) -> Result<(&str, Vec<CommandArg>), CliError> {
    let (verb, rest) = words
        .split_first()
        .ok_or_else(|| CliError::InvalidCommand(String::from("no command given")))?;
    Ok((verb.as_str(), rest.iter().map(CommandArg::from).collect()))
}

fn exec_options(command: &ExecCommand) -> RunOptions {
    let mut options = RunOptions::NONE;
    if command.classified {
        options |= RunOptions::CLASSIFIED;
    }
    if command.ignore_path {
        options |= RunOptions::IGNORE_CONFIGURED_PATH;
    }
    options
}

fn validate_command_args(args: &[String]) -> Result<(), CliError> {
    for arg in args {
        if arg
            .chars()
            .any(|ch| matches!(ch, '\u{0000}'..='\u{001F}' | '\u{007F}'))
        {
            return Err(CliError::InvalidCommand(String::from(concat!(
                "command arguments must not contain control characters (ASCII ",
                "0x00-0x1F or 0x7F, e.g. newline, carriage return, tab, NUL)"
            ))));
        }
    }
    Ok(())
}

fn write_streams(mut stdout: impl Write, mut stderr: impl Write, response: &CommandResponse) {
    if let Some(text) = response.output_text() {
        write!(stdout, "{text}").ok();
    }
    if let Some(text) = response.error_text() {
        write!(stderr, "{text}").ok();
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

fn fake_run_from_env() -> Option<Result<i32, CliError>> {
    if env::var("NEON_FAKE_RUN_ENABLE").ok()?.as_str() != "1" {
        return None;
    }
    let mode = env::var("NEON_FAKE_RUN_MODE").ok()?;
    match mode.as_str() {
        "exit-0" | "exit-7" => {
            writeln!(io::stdout(), "fake-stdout").ok();
            writeln!(io::stderr(), "fake-stderr").ok();
            Some(Ok(if mode == "exit-0" { 0 } else { 7 }))
        }
        "faulted" => Some(Err(CliError::Node(NodeError::Faulted {
            node: String::from("fake"),
        }))),
        _ => None,
    }
}
