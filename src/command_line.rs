//! Rendering of command lines and classified redaction.
//!
//! Arguments are loosely typed: absent values disappear, booleans render as
//! `true`/`false`, and anything containing whitespace is wrapped in double
//! quotes. The same rendering feeds plain commands, sudo commands, and the
//! launcher script generated for bundles.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};

/// Marker substituted for classified command arguments and output.
pub const REDACTED: &str = "!!SECRETS-REDACTED!!";

/// A single command argument.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CommandArg {
    /// Rendered via its string form.
    Text(String),
    /// Rendered as `true` or `false`.
    Flag(bool),
    /// Dropped from the rendered command line.
    Absent,
}

impl CommandArg {
    fn render(&self) -> Option<String> {
        match self {
            Self::Absent => None,
            Self::Flag(value) => Some(value.to_string()),
            Self::Text(text) => Some(quote_if_needed(text)),
        }
    }
}

impl fmt::Display for CommandArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render().unwrap_or_default())
    }
}

impl From<&str> for CommandArg {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for CommandArg {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for CommandArg {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<&Utf8Path> for CommandArg {
    fn from(value: &Utf8Path) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Utf8PathBuf> for CommandArg {
    fn from(value: Utf8PathBuf) -> Self {
        Self::Text(value.into_string())
    }
}

impl From<bool> for CommandArg {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

macro_rules! numeric_args {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for CommandArg {
                fn from(value: $ty) -> Self {
                    Self::Text(value.to_string())
                }
            }
        )*
    };
}

numeric_args!(i32, i64, u16, u32, u64, usize);

impl<T: Into<Self>> From<Option<T>> for CommandArg {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Absent, Into::into)
    }
}

/// Renders `command` followed by its arguments.
///
/// ```
/// use neon::command_line::{CommandArg, render};
///
/// let args = [
///     CommandArg::from("a b"),
///     CommandArg::Absent,
///     CommandArg::from(true),
/// ];
/// assert_eq!(render("echo", &args), "echo \"a b\" true");
/// ```
#[must_use]
pub fn render(command: &str, args: &[CommandArg]) -> String {
    let mut line = command.trim().to_owned();
    for rendered in args.iter().filter_map(CommandArg::render) {
        line.push(' ');
        line.push_str(&rendered);
    }
    line
}

/// Replaces everything after the command verb with [`REDACTED`].
#[must_use]
pub fn redact(command: &str) -> String {
    command
        .split_once(' ')
        .map_or_else(|| command.to_owned(), |(verb, _)| format!("{verb} {REDACTED}"))
}

fn quote_if_needed(text: &str) -> String {
    if text.is_empty() || text.chars().any(char::is_whitespace) {
        format!("\"{text}\"")
    } else {
        text.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&[], "ls")]
    #[case(&[CommandArg::Absent], "ls")]
    #[case(&[CommandArg::Flag(true), CommandArg::Flag(false)], "ls true false")]
    #[case(&[CommandArg::Text(String::from("my dir"))], "ls \"my dir\"")]
    #[case(&[CommandArg::Text(String::from("tab\there"))], "ls \"tab\there\"")]
    #[case(&[CommandArg::Text(String::new())], "ls \"\"")]
    #[case(
        &[CommandArg::Text(String::from("-la")), CommandArg::Absent, CommandArg::Text(String::from("/tmp"))],
        "ls -la /tmp"
    )]
    fn render_formats_arguments(#[case] args: &[CommandArg], #[case] expected: &str) {
        assert_eq!(render("ls", args), expected);
    }

    #[test]
    fn option_arguments_drop_when_none() {
        let none: Option<&str> = None;
        let args = [CommandArg::from(none), CommandArg::from(Some(5_u16))];
        assert_eq!(render("wait", &args), "wait 5");
    }

    #[rstest]
    #[case("vault write secret/x value=1", "vault !!SECRETS-REDACTED!!")]
    #[case("uptime", "uptime")]
    fn redact_keeps_only_the_verb(#[case] command: &str, #[case] expected: &str) {
        assert_eq!(redact(command), expected);
    }
}
