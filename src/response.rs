//! Result record produced by every command invocation.

/// Outcome of a single remote command invocation.
///
/// Responses are immutable once built. Text and binary stdout are mutually
/// exclusive: binary capture leaves [`CommandResponse::output_text`] empty.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandResponse {
    command: String,
    exit_code: i32,
    output_text: Option<String>,
    error_text: Option<String>,
    output_binary: Option<Vec<u8>>,
    session_was_faulted: bool,
}

impl CommandResponse {
    /// Builds a response carrying text output.
    #[must_use]
    pub fn text(
        command: impl Into<String>,
        exit_code: i32,
        output_text: impl Into<String>,
        error_text: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            exit_code,
            output_text: Some(output_text.into()),
            error_text: Some(error_text.into()),
            output_binary: None,
            session_was_faulted: false,
        }
    }

    /// Builds a response carrying binary stdout.
    #[must_use]
    pub fn binary(
        command: impl Into<String>,
        exit_code: i32,
        output_binary: Vec<u8>,
        error_text: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            exit_code,
            output_text: None,
            error_text: Some(error_text.into()),
            output_binary: Some(output_binary),
            session_was_faulted: false,
        }
    }

    /// Synthetic failure returned when a faulted session rejects a command
    /// without contacting the host.
    #[must_use]
    pub fn rejected_faulted(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            exit_code: 1,
            output_text: None,
            error_text: None,
            output_binary: None,
            session_was_faulted: true,
        }
    }

    /// Final command string as sent (or as it would have been sent).
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Remote exit code.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Returns `true` when the exit code is zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Captured text stdout.
    #[must_use]
    pub fn output_text(&self) -> Option<&str> {
        self.output_text.as_deref()
    }

    /// Captured text stderr.
    #[must_use]
    pub fn error_text(&self) -> Option<&str> {
        self.error_text.as_deref()
    }

    /// Captured binary stdout.
    #[must_use]
    pub fn output_binary(&self) -> Option<&[u8]> {
        self.output_binary.as_deref()
    }

    /// Returns `true` when the invocation was rejected because the session
    /// had already faulted.
    #[must_use]
    pub const fn session_was_faulted(&self) -> bool {
        self.session_was_faulted
    }

    /// Stdout and stderr joined, useful for error reporting.
    #[must_use]
    pub fn all_text(&self) -> String {
        let mut text = String::new();
        if let Some(out) = &self.output_text {
            text.push_str(out);
        }
        if let Some(err) = &self.error_text {
            if !text.is_empty() && !text.ends_with('\n') && !err.is_empty() {
                text.push('\n');
            }
            text.push_str(err);
        }
        text
    }
}
