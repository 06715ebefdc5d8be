//! Execution modifiers applied to every remote command invocation.
//!
//! [`RunOptions`] is a small bitflag set. Each flag is independent and any
//! combination is legal; the node session interprets them while building,
//! logging, and post-processing a command.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Sub};

/// Set of independent execution flags for a single invocation.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct RunOptions(u16);

impl RunOptions {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// Merge in the session's configured default flag set.
    pub const USE_DEFAULTS: Self = Self(1 << 0);
    /// A non-zero exit code faults the session.
    pub const FAULT_ON_NON_ZERO_EXIT: Self = Self(1 << 1);
    /// Bypass the "skip commands while faulted" guard.
    pub const RUN_EVEN_IF_FAULTED: Self = Self(1 << 2);
    /// Do not prepend the session's `PATH` export.
    pub const IGNORE_CONFIGURED_PATH: Self = Self(1 << 3);
    /// Capture stdout as bytes through an intermediate remote file.
    pub const BINARY_OUTPUT: Self = Self(1 << 4);
    /// Redact arguments and captured output in logs.
    pub const CLASSIFIED: Self = Self(1 << 5);
    /// Suppress success-path logging.
    pub const LOG_ONLY_ON_ERROR: Self = Self(1 << 6);
    /// Log stdout even when the command succeeds.
    pub const LOG_OUTPUT: Self = Self(1 << 7);
    /// The caller already logged the `START` line.
    pub(crate) const SUPPRESS_START_LINE: Self = Self(1 << 8);
    /// Mark the invocation for audit-trail retention.
    pub const AUDIT: Self = Self(1 << 9);

    const NAMES: [(Self, &'static str); 10] = [
        (Self::USE_DEFAULTS, "UseDefaults"),
        (Self::FAULT_ON_NON_ZERO_EXIT, "FaultOnNonZeroExit"),
        (Self::RUN_EVEN_IF_FAULTED, "RunEvenIfFaulted"),
        (Self::IGNORE_CONFIGURED_PATH, "IgnoreConfiguredPath"),
        (Self::BINARY_OUTPUT, "BinaryOutput"),
        (Self::CLASSIFIED, "Classified"),
        (Self::LOG_ONLY_ON_ERROR, "LogOnlyOnError"),
        (Self::LOG_OUTPUT, "LogOutput"),
        (Self::SUPPRESS_START_LINE, "SuppressStartLine"),
        (Self::AUDIT, "Audit"),
    ];

    /// Returns `true` when every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` when no flags are set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns the union of both flag sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns `self` with the flags in `other` cleared.
    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Applies `USE_DEFAULTS` by merging `defaults` into the set.
    ///
    /// The `USE_DEFAULTS` bit itself is consumed.
    #[must_use]
    pub const fn resolve(self, defaults: Self) -> Self {
        if self.contains(Self::USE_DEFAULTS) {
            self.without(Self::USE_DEFAULTS).union(defaults.without(Self::USE_DEFAULTS))
        } else {
            self
        }
    }
}

impl BitOr for RunOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for RunOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl BitAnd for RunOptions {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Sub for RunOptions {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.without(rhs)
    }
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("RunOptions(None)");
        }
        let names = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect::<Vec<_>>()
            .join(" | ");
        write!(f, "RunOptions({names})")
    }
}
