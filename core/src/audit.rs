//! Shared pieces of the audit log lines emitted while planning and
//! committing.

use std::fmt;

use serde_json::Value;

/// Longest rendered value in an audit line before it is elided.
const MAX_LOGGED_VALUE_CHARS: usize = 50;

/// Direction of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Apply,
    Revert,
}

/// Prefix of every audit line, e.g. `[patch]` or `[dry-run] [revert]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogTag {
    pub mode: Mode,
    pub dry_run: bool,
}

impl LogTag {
    pub fn new(mode: Mode, dry_run: bool) -> Self {
        Self { mode, dry_run }
    }
}

impl fmt::Display for LogTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            f.write_str("[dry-run] ")?;
        }
        match self.mode {
            Mode::Apply => f.write_str("[patch]"),
            Mode::Revert => f.write_str("[revert]"),
        }
    }
}

/// Compact, length-bounded rendering of a JSON value for audit lines.
/// A missing value renders as `undefined`.
pub fn loggable_json_value(value: Option<&Value>) -> String {
    let Some(value) = value else {
        return "undefined".to_string();
    };
    let rendered = value.to_string();
    match rendered.char_indices().nth(MAX_LOGGED_VALUE_CHARS) {
        Some((cut, _)) => format!("{} ...", &rendered[..cut]),
        None => rendered,
    }
}
