//! Fixed remote filesystem layout shared by every managed host.

/// Host configuration files.
pub const CONFIG_FOLDER: &str = "/etc/neon";
/// Secrets written during setup.
pub const SECRETS_FOLDER: &str = "/etc/neon/secrets";
/// Persistent node state.
pub const STATE_FOLDER: &str = "/var/lib/neon";
/// Setup scripts.
pub const SETUP_FOLDER: &str = "/lib/neon/setup";
/// Helper tools added to the remote `PATH`.
pub const TOOLS_FOLDER: &str = "/lib/neon/tools";
/// Shared scripts.
pub const SCRIPTS_FOLDER: &str = "/lib/neon/scripts";
/// Archived artifacts.
pub const ARCHIVE_FOLDER: &str = "/var/lib/neon/archive";
/// Root under which command bundles are extracted.
pub const EXEC_FOLDER: &str = "/var/lib/neon/exec";
/// Per-user staging directory for two-phase uploads (`~/.upload`). Both
/// the shell and the copy channel start in the login home, so the path
/// stays relative.
pub const UPLOAD_FOLDER: &str = ".upload";

/// Mode applied to every host folder except [`EXEC_FOLDER`].
pub const HOST_FOLDER_MODE: u32 = 0o600;
/// Mode applied to [`EXEC_FOLDER`] so unprivileged uploads can land there.
pub const EXEC_FOLDER_MODE: u32 = 0o777;

/// Host folders in creation order, with the mode each receives.
pub const HOST_FOLDERS: [(&str, u32); 8] = [
    (CONFIG_FOLDER, HOST_FOLDER_MODE),
    (SECRETS_FOLDER, HOST_FOLDER_MODE),
    (STATE_FOLDER, HOST_FOLDER_MODE),
    (SETUP_FOLDER, HOST_FOLDER_MODE),
    (TOOLS_FOLDER, HOST_FOLDER_MODE),
    (SCRIPTS_FOLDER, HOST_FOLDER_MODE),
    (ARCHIVE_FOLDER, HOST_FOLDER_MODE),
    (EXEC_FOLDER, EXEC_FOLDER_MODE),
];

/// Builds the shell command that creates every host folder.
#[must_use]
pub fn prepare_folders_command() -> String {
    HOST_FOLDERS
        .iter()
        .map(|(folder, mode)| format!("mkdir -p {folder} && chmod {mode:o} {folder}"))
        .collect::<Vec<_>>()
        .join(" && ")
}
