//! Resolving package names to installed package directories.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{AmendError, Result};

/// Finds every installed copy of a package.
#[async_trait]
pub trait PackageLocator: Send + Sync {
    /// Absolute directories of every installed copy of `package`. An empty
    /// list means the package is not installed.
    async fn locate(&self, package: &str) -> Result<Vec<PathBuf>>;
}

/// Asks the package manager via `npm ls --parseable <name>`, which lists one
/// directory per installed version (npm, yarn 1.x and pnpm layouts).
#[derive(Debug, Clone)]
pub struct NpmLsLocator {
    project_root: PathBuf,
    npm_bin: String,
}

impl NpmLsLocator {
    /// Overrides the `npm` executable.
    pub const ENV_NPM_BIN: &'static str = "AMEND_PACKAGE_NPM";

    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let npm_bin = std::env::var(Self::ENV_NPM_BIN)
            .ok()
            .filter(|bin| !bin.trim().is_empty())
            .unwrap_or_else(|| "npm".to_string());
        Self {
            project_root: project_root.into(),
            npm_bin,
        }
    }

    pub fn with_npm_bin(mut self, npm_bin: impl Into<String>) -> Self {
        self.npm_bin = npm_bin.into();
        self
    }
}

#[async_trait]
impl PackageLocator for NpmLsLocator {
    async fn locate(&self, package: &str) -> Result<Vec<PathBuf>> {
        tracing::info!("[cmd_exec_inline]: {} ls --parseable {package}", self.npm_bin);
        let output = Command::new(&self.npm_bin)
            .arg("ls")
            .arg("--parseable")
            .arg(package)
            .current_dir(&self.project_root)
            .output()
            .await
            .map_err(|e| AmendError::Locate {
                package: package.to_string(),
                message: format!("failed to execute {}: {e}", self.npm_bin),
            })?;

        if !output.status.success() {
            // npm exits non-zero for missing or extraneous packages but still
            // prints whatever it found.
            tracing::warn!(
                "[cmd_exec_failed] exit code: {}, stderr: {}",
                output
                    .status
                    .code()
                    .map_or_else(|| "none".to_string(), |code| code.to_string()),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_parseable_output(&stdout, &self.project_root))
    }
}

/// Split `npm ls --parseable` output into package directories, dropping
/// blank lines and the project root itself.
pub fn parse_parseable_output(stdout: &str, project_root: &Path) -> Vec<PathBuf> {
    let canonical_root = dunce::canonicalize(project_root).ok();
    stdout
        .split(['\n', '\r'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .filter(|dir| {
            dir != project_root
                && canonical_root
                    .as_deref()
                    .is_none_or(|root| dunce::canonicalize(dir).ok().as_deref() != Some(root))
        })
        .collect()
}

/// Fixed mapping from package name to directories.
#[derive(Debug, Clone, Default)]
pub struct StaticLocator {
    dirs: HashMap<String, Vec<PathBuf>>,
}

impl StaticLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_package<I, P>(mut self, package: impl Into<String>, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.dirs
            .entry(package.into())
            .or_default()
            .extend(dirs.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl PackageLocator for StaticLocator {
    async fn locate(&self, package: &str) -> Result<Vec<PathBuf>> {
        Ok(self.dirs.get(package).cloned().unwrap_or_default())
    }
}
