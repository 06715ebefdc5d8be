//! Uploads and downloads.
//!
//! The copy protocol cannot write to privileged paths, so every upload first
//! lands in the login user's staging folder and is then moved into place,
//! optionally under sudo.

use std::borrow::Cow;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use shell_escape::unix::escape;

use crate::layout::UPLOAD_FOLDER;
use crate::text;
use crate::transport::SshTransport;

use super::{NodeError, NodeProxy};

impl<M, T: SshTransport> NodeProxy<M, T> {
    /// Writes `contents` to `remote_path`, moving it into place with sudo
    /// when `as_root` is set.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::InvalidArgument`] for an empty target or
    /// [`NodeError::Faulted`] on a faulted session. Staging or moving
    /// failures surface as [`NodeError::Step`]; transport failures are
    /// propagated.
    pub fn upload(&self, remote_path: &str, contents: &[u8], as_root: bool) -> Result<(), NodeError> {
        if remote_path.trim().is_empty() {
            return Err(NodeError::InvalidArgument(String::from(
                "upload target path is empty",
            )));
        }
        self.ensure_usable_for_files()?;
        self.ensure_upload_folder()?;

        let staged = format!("{UPLOAD_FOLDER}/{}", self.unique_name());
        self.ensure_transfer()?;
        self.transport().upload(contents, &staged)?;

        let parent = Utf8Path::new(remote_path)
            .parent()
            .map(Utf8Path::as_str)
            .filter(|parent| !parent.is_empty())
            .unwrap_or(".");
        // Sudo is applied per command: escaped paths may contain single
        // quotes, which the `bash -c` wrapper cannot carry.
        let sudo = if as_root { "sudo " } else { "" };
        self.step(
            &format!(
                "{sudo}mkdir -p {} && {sudo}mv {staged} {}",
                escape(Cow::from(parent)),
                escape(Cow::from(remote_path)),
            ),
            false,
            "move upload into place",
        )
    }

    /// Uploads text after normalising line endings, dropping a leading
    /// byte-order mark, and expanding tabs when `tab_stop` is non-zero.
    ///
    /// # Errors
    ///
    /// Same as [`NodeProxy::upload`].
    pub fn upload_text(
        &self,
        remote_path: &str,
        body: &str,
        tab_stop: usize,
        as_root: bool,
    ) -> Result<(), NodeError> {
        let normalised = text::normalize(body, tab_stop);
        self.upload(remote_path, normalised.as_bytes(), as_root)
    }

    /// Reads a remote file.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Faulted`] on a faulted session and propagates
    /// transport failures.
    pub fn download(&self, remote_path: &str) -> Result<Vec<u8>, NodeError> {
        self.ensure_usable_for_files()?;
        self.ensure_transfer()?;
        Ok(self.transport().download(remote_path)?)
    }

    /// Reads a remote file as UTF-8 text, replacing invalid sequences.
    ///
    /// # Errors
    ///
    /// Same as [`NodeProxy::download`].
    pub fn download_text(&self, remote_path: &str) -> Result<String, NodeError> {
        let bytes = self.download(remote_path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Copies a remote file to `local`, creating missing local parents.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Io`] when the local file cannot be written, plus
    /// every error [`NodeProxy::download`] can return.
    pub fn download_to(&self, remote_path: &str, local: &Utf8Path) -> Result<(), NodeError> {
        let bytes = self.download(remote_path)?;
        write_local(local, &bytes)
    }

    /// Reports whether `remote_path` names a regular file.
    ///
    /// # Errors
    ///
    /// Propagates execution errors.
    pub fn file_exists(&self, remote_path: &str) -> Result<bool, NodeError> {
        let response = self.sudo_command(
            "test",
            &["-f".into(), remote_path.into()],
            super::exec::STEP_OPTIONS,
        )?;
        Ok(response.is_success())
    }

    fn ensure_usable_for_files(&self) -> Result<(), NodeError> {
        self.ensure_not_disposed()?;
        if self.is_faulted() {
            return Err(NodeError::Faulted {
                node: self.name().to_owned(),
            });
        }
        Ok(())
    }

    fn ensure_upload_folder(&self) -> Result<(), NodeError> {
        if self.upload_folder_ready() {
            return Ok(());
        }
        self.step(
            &format!("mkdir -p {UPLOAD_FOLDER} && chmod 700 {UPLOAD_FOLDER}"),
            false,
            "create upload folder",
        )?;
        self.set_upload_folder_ready();
        Ok(())
    }
}

fn write_local(path: &Utf8Path, bytes: &[u8]) -> Result<(), NodeError> {
    let io_error = |target: &Utf8Path, err: std::io::Error| NodeError::Io {
        path: target.to_path_buf(),
        message: err.to_string(),
    };
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path.file_name().ok_or_else(|| NodeError::Io {
        path: path.to_path_buf(),
        message: String::from("download target is missing a file name"),
    })?;

    Dir::create_ambient_dir_all(parent, ambient_authority())
        .map_err(|err| io_error(parent, err))?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|err| io_error(parent, err))?;
    dir.write(file_name, bytes).map_err(|err| io_error(path, err))
}
