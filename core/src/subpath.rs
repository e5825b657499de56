//! Canonical keys for the documents of one package.
//!
//! The root manifest is keyed by the empty string. A sub-document in
//! `<package>/dist/esm/package.json` is keyed by `dist/esm/package.json`.
//! Keys always use `/` regardless of the host platform.

use std::path::{Path, PathBuf};

use crate::document::MANIFEST_FILE_NAME;
use crate::error::{AmendError, Result};

/// Ledger key of the root manifest.
pub const ROOT_KEY: &str = "";

/// A validated directory below a package root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubDir {
    segments: Vec<String>,
}

impl SubDir {
    /// Validate user supplied segments such as `["dist"]` or `["src", "util"]`.
    pub fn new<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        let reject = |reason| {
            Err(AmendError::InvalidSubPath {
                segments: segments.clone(),
                reason,
            })
        };

        if segments.is_empty() {
            return reject("at least one segment is required");
        }
        for segment in &segments {
            if segment.is_empty() {
                return reject("segments must be non-empty");
            }
            if segment == "." || segment == ".." {
                return reject("relative segments are not allowed");
            }
            if segment.contains(['/', '\\']) {
                return reject("segments must not contain path separators");
            }
        }
        Ok(Self { segments })
    }

    /// Absolute directory below `package_dir`.
    pub fn dir_in(&self, package_dir: &Path) -> PathBuf {
        self.segments
            .iter()
            .fold(package_dir.to_path_buf(), |acc, segment| acc.join(segment))
    }

    /// Absolute path of the sub-document manifest.
    pub fn manifest_in(&self, package_dir: &Path) -> PathBuf {
        self.dir_in(package_dir).join(MANIFEST_FILE_NAME)
    }

    /// Ledger key of the sub-document manifest.
    pub fn manifest_key(&self) -> String {
        let mut key = self.segments.join("/");
        key.push('/');
        key.push_str(MANIFEST_FILE_NAME);
        key
    }
}

/// Resolve a ledger key back to the file it describes.
///
/// Keys read from disk are validated like amender input, so a tampered
/// ledger cannot point outside the package directory.
pub fn manifest_path_for_key(package_dir: &Path, key: &str) -> Result<PathBuf> {
    if key == ROOT_KEY {
        return Ok(package_dir.join(MANIFEST_FILE_NAME));
    }
    let Some(dir) = key
        .strip_suffix(MANIFEST_FILE_NAME)
        .and_then(|dir| dir.strip_suffix('/'))
    else {
        return Err(AmendError::InvalidSubPath {
            segments: vec![key.to_string()],
            reason: "ledger keys must end in /package.json",
        });
    };
    Ok(SubDir::new(dir.split('/'))?.manifest_in(package_dir))
}
