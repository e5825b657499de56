//! A single `package.json`-style JSON object held in memory.
//!
//! Key order is preserved (`serde_json/preserve_order`) so a rewritten
//! manifest only differs from the original where it was amended.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::{AmendError, Result};

/// File name of every manifest the engine touches.
pub const MANIFEST_FILE_NAME: &str = "package.json";

/// One JSON object file.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    path: PathBuf,
    content: Map<String, Value>,
}

impl Document {
    /// Read and parse `path`. The file must hold a JSON object.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let raw = std::fs::read_to_string(&path).map_err(|e| AmendError::io(&path, e))?;
        let value: Value = serde_json::from_str(&raw).map_err(|source| AmendError::Json {
            path: path.clone(),
            source,
        })?;
        match value {
            Value::Object(content) => Ok(Self { path, content }),
            _ => Err(AmendError::NotAnObject { path }),
        }
    }

    /// A document that does not exist on disk yet.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            content: Map::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content(&self) -> &Map<String, Value> {
        &self.content
    }

    pub fn into_content(self) -> Map<String, Value> {
        self.content
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.content.get(key)
    }

    /// Insert or replace `key`. An existing key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.content.insert(key.into(), value)
    }

    /// Remove `key` without reordering the remaining keys.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.content.shift_remove(key)
    }

    /// The `version` field, when it is a string.
    pub fn version(&self) -> Option<&str> {
        self.content.get("version").and_then(Value::as_str)
    }
}

/// Render manifest content the way it is written to disk: two-space
/// indentation and a trailing newline.
pub fn to_pretty_json(content: &Map<String, Value>) -> serde_json::Result<String> {
    let mut out = serde_json::to_string_pretty(content)?;
    out.push('\n');
    Ok(out)
}
