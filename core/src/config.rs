//! Declarative amender configuration.
//!
//! A config maps package names to rules:
//!
//! ```toml
//! [packages.zrender]
//! skip_if_present = ["exports"]
//!
//! [packages.zrender.set]
//! type = "module"
//! exports = { "." = { types = "./index.d.ts", import = "./index.js" }, "./*" = "./*" }
//!
//! [[packages.zrender.sub_documents]]
//! path = ["dist"]
//! set = { type = "commonjs" }
//! ```
//!
//! TOML and JSON files are accepted; key order is preserved in both.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AmendError, Result};
use crate::ledger::LEDGER_KEY;
use crate::subpath::SubDir;

/// Root configuration: one rule per package name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AmendConfig {
    #[serde(default)]
    pub packages: IndexMap<String, PackageRule>,
}

/// Declarative amender for one package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageRule {
    /// Abort the run unless `package.json` has exactly this version.
    #[serde(default)]
    pub expect_version: Option<String>,

    /// Leave the package alone if any of these keys already has a truthy
    /// value (e.g. a release that ships its own `exports`).
    #[serde(default)]
    pub skip_if_present: Vec<String>,

    /// Top-level keys to set on the root `package.json`, in order.
    #[serde(default)]
    pub set: IndexMap<String, Value>,

    /// Nested `package.json` files to create or update.
    #[serde(default)]
    pub sub_documents: Vec<SubDocumentRule>,
}

/// Keys to set on `<package>/<path...>/package.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubDocumentRule {
    pub path: Vec<String>,

    #[serde(default)]
    pub set: IndexMap<String, Value>,
}

impl AmendConfig {
    /// Environment variable naming a config file when none is passed.
    pub const ENV_CONFIG_PATH: &'static str = "AMEND_PACKAGE_CONFIG";

    /// Load a `.json` or `.toml` config file.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AmendError::config_with_source(
                format!("failed to read config at {}", path.display()),
                e,
            )
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::parse_json(&contents)
        } else {
            Self::parse_toml(&contents)
        }
    }

    /// Load the file named by [`Self::ENV_CONFIG_PATH`], if set.
    pub fn load_from_env() -> Result<Option<Self>> {
        match Self::env_config_path() {
            Some(path) => Self::load_from_path(&path).map(Some),
            None => Ok(None),
        }
    }

    fn env_config_path() -> Option<PathBuf> {
        std::env::var_os(Self::ENV_CONFIG_PATH)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(contents: &str) -> Result<Self> {
        let cfg: AmendConfig = toml::from_str(contents)
            .map_err(|e| AmendError::config_with_source("failed to parse TOML config", e))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse configuration from a JSON string
    pub fn parse_json(contents: &str) -> Result<Self> {
        let cfg: AmendConfig = serde_json::from_str(contents)
            .map_err(|e| AmendError::config_with_source("failed to parse JSON config", e))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.packages.is_empty() {
            return Err(AmendError::config("no package amender registered"));
        }

        for (name, rule) in &self.packages {
            if name.trim().is_empty() {
                return Err(AmendError::config("package names must be non-empty"));
            }
            if rule.set.contains_key(LEDGER_KEY) {
                return Err(AmendError::config(format!(
                    "\"{name}\" sets the reserved key \"{LEDGER_KEY}\""
                )));
            }
            for sub in &rule.sub_documents {
                SubDir::new(sub.path.iter().cloned()).map_err(|e| {
                    AmendError::config_with_source(format!("invalid sub document for \"{name}\""), e)
                })?;
            }
            if rule.set.is_empty() && rule.sub_documents.is_empty() {
                tracing::warn!(package = %name, "rule has nothing to set");
            }
        }

        Ok(())
    }
}
