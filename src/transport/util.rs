//! Path helpers for locating local SSH material.

/// Expands a leading `~/` to the invoking user's home directory.
///
/// When `HOME` is unset the path is returned untouched, leaving `ssh` to
/// report the missing key itself.
///
/// ```
/// # use neon::transport::expand_tilde;
/// let home = std::env::var("HOME").expect("HOME should be set");
/// assert_eq!(expand_tilde("~/.ssh/id_ed25519"), format!("{home}/.ssh/id_ed25519"));
/// assert_eq!(expand_tilde("/etc/neon/key"), "/etc/neon/key");
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}
