//! Error types for the amend/revert engine.
//!
//! Precondition failures (`UnknownPackage`, `InvalidSubPath`, ...) are always
//! fatal for the current call. Amender failures abort the run before any
//! file is committed.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while planning or committing manifest amendments.
#[derive(Debug, Error)]
pub enum AmendError {
    #[error("no package amender registered")]
    NoAmendersRegistered,

    #[error("unknown package: {0}")]
    UnknownPackage(String),

    #[error("{path} is listed for both \"{first}\" and \"{second}\"")]
    DuplicateDirectory {
        path: PathBuf,
        first: String,
        second: String,
    },

    #[error("package.json not found in {0}")]
    RootManifestMissing(PathBuf),

    #[error("invalid sub path {segments:?}: {reason}")]
    InvalidSubPath {
        segments: Vec<String>,
        reason: &'static str,
    },

    #[error("{0} does not exist")]
    SubDirectoryMissing(PathBuf),

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("\"{0}\" is reserved for the revert ledger")]
    ReservedKey(String),

    #[error("{path} does not contain a JSON object")]
    NotAnObject { path: PathBuf },

    #[error("malformed revert ledger in {path}: {source}")]
    MalformedLedger {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("version mismatch for \"{package}\": expected {expected}, found {found}")]
    VersionMismatch {
        package: String,
        expected: String,
        found: String,
    },

    /// Raised by amenders for package-specific failures.
    #[error("amender for \"{package}\" failed: {message}")]
    Amender { package: String, message: String },

    #[error("failed to locate package \"{package}\": {message}")]
    Locate { package: String, message: String },

    #[error("config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("session cancelled after a sibling session failed")]
    Cancelled,

    #[error("session task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl AmendError {
    /// Create an amender error.
    pub fn amender(package: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Amender {
            package: package.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the run was rejected because of how it was invoked (no
    /// amenders configured, or a package name the config does not know).
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Self::NoAmendersRegistered | Self::UnknownPackage(_))
    }
}

/// Result type for amend operations
pub type Result<T> = std::result::Result<T, AmendError>;
