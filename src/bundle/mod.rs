//! Command bundles: an entry command shipped together with its files.
//!
//! A bundle is packed into an in-memory ZIP archive together with a
//! generated launcher script (`__run.sh`). The node session uploads the
//! archive, unpacks it on the host with `unzip`, and runs the launcher from
//! the extraction folder. The launcher marks executable files with the mode
//! appropriate for the caller's privilege level before invoking the entry
//! command.

use std::io::{Cursor, Read, Write};

use shell_escape::unix::escape;
use thiserror::Error;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::command_line::{self, CommandArg};
use crate::text;

/// Name of the generated launcher script inside every bundle.
pub const LAUNCHER_NAME: &str = "__run.sh";

/// Mode applied to executable files when the bundle runs unprivileged.
pub const USER_EXEC_MODE: u32 = 0o707;

/// Mode applied to executable files when the bundle runs under sudo.
pub const SUDO_EXEC_MODE: u32 = 0o700;

/// Errors raised while validating or packing a bundle.
#[derive(Debug, Error)]
pub enum BundleError {
    /// The entry command is blank.
    #[error("bundle command must not be empty")]
    EmptyCommand,
    /// The bundle carries no files.
    #[error("bundle `{command}` contains no files")]
    NoFiles {
        /// Entry command of the rejected bundle.
        command: String,
    },
    /// A file path is empty, absolute, escapes the bundle, or collides
    /// with the launcher.
    #[error("invalid bundle file path `{path}`")]
    InvalidPath {
        /// Offending path.
        path: String,
    },
    /// Archive construction or extraction failed.
    #[error("bundle archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    /// Reading or writing archive bytes failed.
    #[error("bundle I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Contents of a bundled file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BundleContents {
    /// Text, packed byte for byte as given.
    Text(String),
    /// Opaque bytes, packed verbatim.
    Binary(Vec<u8>),
}

impl BundleContents {
    /// Bytes written to the archive.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(body) => body.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }
}

/// A file shipped inside a bundle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BundleFile {
    /// Path relative to the extraction folder.
    pub path: String,
    /// File contents.
    pub contents: BundleContents,
    /// Whether the launcher marks the file executable.
    pub is_executable: bool,
}

impl BundleFile {
    /// Creates a text file entry whose contents are packed unchanged.
    #[must_use]
    pub fn text(path: impl Into<String>, body: impl Into<String>, is_executable: bool) -> Self {
        Self {
            path: path.into(),
            contents: BundleContents::Text(body.into()),
            is_executable,
        }
    }

    /// Creates a text file entry with LF line endings and no leading
    /// byte-order mark, for scripts authored on hosts with CRLF endings.
    #[must_use]
    pub fn text_lf(path: impl Into<String>, body: &str, is_executable: bool) -> Self {
        Self::text(path, text::normalize(body, 0), is_executable)
    }

    /// Creates a binary file entry.
    #[must_use]
    pub fn binary(path: impl Into<String>, bytes: Vec<u8>, is_executable: bool) -> Self {
        Self {
            path: path.into(),
            contents: BundleContents::Binary(bytes),
            is_executable,
        }
    }
}

/// An entry command plus the files it needs on the host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandBundle {
    command: String,
    args: Vec<CommandArg>,
    files: Vec<BundleFile>,
}

impl CommandBundle {
    /// Creates an empty bundle for `command` with `args`.
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<CommandArg>) -> Self {
        Self {
            command: command.into(),
            args,
            files: Vec::new(),
        }
    }

    /// Appends a file; order is preserved in the archive and launcher.
    pub fn add_file(&mut self, file: BundleFile) -> &mut Self {
        self.files.push(file);
        self
    }

    /// Builder-style variant of [`CommandBundle::add_file`].
    #[must_use]
    pub fn with_file(mut self, file: BundleFile) -> Self {
        self.files.push(file);
        self
    }

    /// Entry command.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Entry command arguments.
    #[must_use]
    pub fn args(&self) -> &[CommandArg] {
        &self.args
    }

    /// Bundled files in insertion order.
    #[must_use]
    pub fn files(&self) -> &[BundleFile] {
        &self.files
    }

    /// Entry command rendered with its arguments.
    #[must_use]
    pub fn command_line(&self) -> String {
        command_line::render(&self.command, &self.args)
    }

    /// Checks the bundle invariants.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::EmptyCommand`] for a blank command,
    /// [`BundleError::NoFiles`] when no files were added, and
    /// [`BundleError::InvalidPath`] for unusable file paths.
    pub fn validate(&self) -> Result<(), BundleError> {
        if self.command.trim().is_empty() {
            return Err(BundleError::EmptyCommand);
        }
        if self.files.is_empty() {
            return Err(BundleError::NoFiles {
                command: self.command.clone(),
            });
        }
        for file in &self.files {
            validate_path(&file.path)?;
        }
        Ok(())
    }

    /// Generates the launcher script for the given executable mode.
    #[must_use]
    pub fn launcher_script(&self, exec_mode: u32) -> String {
        let mut script = String::from("#!/bin/bash\n");
        for file in self.files.iter().filter(|file| file.is_executable) {
            let path = escape(file.path.as_str().into());
            script.push_str(&format!("chmod {exec_mode:o} {path}\n"));
        }
        script.push_str(&self.command_line());
        script.push('\n');
        script
    }

    /// Packs the bundle files and launcher into an in-memory ZIP archive.
    ///
    /// # Errors
    ///
    /// Returns any validation failure from [`CommandBundle::validate`] or an
    /// archive error when writing fails.
    pub fn package(&self, exec_mode: u32) -> Result<Vec<u8>, BundleError> {
        self.validate()?;

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let regular = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);
        let executable = regular.unix_permissions(0o755);

        for file in &self.files {
            let options = if file.is_executable { executable } else { regular };
            writer.start_file(file.path.as_str(), options)?;
            writer.write_all(file.contents.as_bytes())?;
        }

        writer.start_file(LAUNCHER_NAME, executable)?;
        writer.write_all(self.launcher_script(exec_mode).as_bytes())?;

        Ok(writer.finish()?.into_inner())
    }
}

/// A file recovered from a packed bundle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnpackedFile {
    /// Path inside the archive.
    pub path: String,
    /// Raw file bytes.
    pub bytes: Vec<u8>,
}

/// Extracts every entry of a bundle archive, in archive order.
///
/// # Errors
///
/// Returns [`BundleError::Archive`] when the bytes are not a readable ZIP
/// archive.
pub fn unpack_archive(archive: &[u8]) -> Result<Vec<UnpackedFile>, BundleError> {
    let mut zip = ZipArchive::new(Cursor::new(archive))?;
    let mut files = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        files.push(UnpackedFile {
            path: entry.name().to_owned(),
            bytes,
        });
    }
    Ok(files)
}

fn validate_path(path: &str) -> Result<(), BundleError> {
    let invalid = path.trim().is_empty()
        || path.starts_with('/')
        || path == LAUNCHER_NAME
        || path.split('/').any(|segment| segment == "..");
    if invalid {
        return Err(BundleError::InvalidPath {
            path: path.to_owned(),
        });
    }
    Ok(())
}
