//! Revert ledger embedded in the root manifest.
//!
//! The ledger records, per document of a package, the value every amended
//! key had before the first amendment (or that the key or the whole file did
//! not exist). It lives under [`LEDGER_KEY`] inside the root `package.json`
//! so it survives across runs until a revert consumes it.
//!
//! On disk:
//!
//! ```text
//! "__amend_package__ledger__": {
//!   "": {                                  // ./package.json
//!     "type": {"value": "commonjs"},       // original value
//!     "exports": "ABSENT_KEY"              // key did not exist
//!   },
//!   "dist/package.json": "ABSENT_FILE"     // file did not exist
//! }
//! ```
//!
//! Present values are always wrapped in `{"value": ...}`, so no manifest
//! value can be mistaken for a sentinel.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::Document;
use crate::error::{AmendError, Result};

/// Reserved top-level key of the root manifest that holds the ledger.
pub const LEDGER_KEY: &str = "__amend_package__ledger__";

/// Original state of one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Recorded {
    #[serde(rename = "ABSENT_KEY")]
    WasAbsent,
    #[serde(rename = "value")]
    Value(Value),
}

/// Original state of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PartRepr", into = "PartRepr")]
pub enum Part {
    /// The file did not exist before the first amendment.
    AbsentFile,
    /// Original values of every key amended so far.
    Keys(IndexMap<String, Recorded>),
}

#[derive(Serialize, Deserialize)]
enum FileMarker {
    #[serde(rename = "ABSENT_FILE")]
    AbsentFile,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PartRepr {
    Marker(FileMarker),
    Keys(IndexMap<String, Recorded>),
}

impl From<PartRepr> for Part {
    fn from(repr: PartRepr) -> Self {
        match repr {
            PartRepr::Marker(FileMarker::AbsentFile) => Part::AbsentFile,
            PartRepr::Keys(keys) => Part::Keys(keys),
        }
    }
}

impl From<Part> for PartRepr {
    fn from(part: Part) -> Self {
        match part {
            Part::AbsentFile => PartRepr::Marker(FileMarker::AbsentFile),
            Part::Keys(keys) => PartRepr::Keys(keys),
        }
    }
}

impl Part {
    /// Remember the current state of `key` unless it is already known.
    ///
    /// The first recording wins: re-applying an amendment never replaces a
    /// pre-patch value with an already-patched one.
    pub fn record_if_absent(&mut self, content: &Map<String, Value>, key: &str) {
        let Part::Keys(keys) = self else {
            return;
        };
        if keys.contains_key(key) {
            return;
        }
        let original = match content.get(key) {
            Some(value) => Recorded::Value(value.clone()),
            None => Recorded::WasAbsent,
        };
        keys.insert(key.to_string(), original);
    }

    pub fn is_absent_file(&self) -> bool {
        matches!(self, Part::AbsentFile)
    }

    /// Original value recorded for `key`, if any.
    pub fn recorded(&self, key: &str) -> Option<&Recorded> {
        match self {
            Part::AbsentFile => None,
            Part::Keys(keys) => keys.get(key),
        }
    }
}

/// One step of restoring a document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RevertOp<'a> {
    /// The key did not exist originally.
    Delete(&'a str),
    /// Restore the original value.
    Set(&'a str, &'a Value),
}

/// Iterator over the restore steps of one document.
pub struct RevertOps<'a> {
    inner: indexmap::map::Iter<'a, String, Recorded>,
}

impl<'a> Iterator for RevertOps<'a> {
    type Item = RevertOp<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, recorded)| match recorded {
            Recorded::WasAbsent => RevertOp::Delete(key),
            Recorded::Value(value) => RevertOp::Set(key, value),
        })
    }
}

/// Receives the outcome of [`Ledger::perform_revert`].
pub trait RevertVisitor {
    /// The document at `key` did not exist before patching.
    fn delete_file(&mut self, key: &str) -> Result<()>;

    /// The document at `key` existed; `ops` restores its amended keys.
    fn update_document(&mut self, key: &str, ops: RevertOps<'_>) -> Result<()>;
}

/// All parts recorded for one package, keyed by sub-path key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    parts: IndexMap<String, Part>,
}

impl Ledger {
    /// Parse the ledger stored in `root`, or start an empty one.
    pub fn open(root: &Document) -> Result<Self> {
        match root.get(LEDGER_KEY) {
            Some(value) => Self::parse(root, value.clone()),
            None => Ok(Self::default()),
        }
    }

    /// Remove the ledger from `root` and return it. `None` means the package
    /// was never patched.
    pub fn take_from(root: &mut Document) -> Result<Option<Self>> {
        match root.remove(LEDGER_KEY) {
            Some(value) => Self::parse(root, value).map(Some),
            None => Ok(None),
        }
    }

    fn parse(root: &Document, value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|source| AmendError::MalformedLedger {
            path: root.path().to_path_buf(),
            source,
        })
    }

    /// Write the ledger back under [`LEDGER_KEY`]. An existing ledger key
    /// keeps its position in the manifest.
    pub fn store_into(&self, root: &mut Document) -> Result<()> {
        let value = serde_json::to_value(self).map_err(|source| AmendError::Json {
            path: root.path().to_path_buf(),
            source,
        })?;
        root.insert(LEDGER_KEY, value);
        Ok(())
    }

    /// Return the part for `key`, creating it on first use.
    ///
    /// A part is never re-initialized, so `existed_before` only matters the
    /// first time a document is registered.
    pub fn register_part(&mut self, key: &str, existed_before: bool) -> &mut Part {
        self.parts.entry(key.to_string()).or_insert_with(|| {
            if existed_before {
                Part::Keys(IndexMap::new())
            } else {
                Part::AbsentFile
            }
        })
    }

    pub fn part(&self, key: &str) -> Option<&Part> {
        self.parts.get(key)
    }

    /// Walk every recorded part in registration order.
    pub fn perform_revert(&self, visitor: &mut dyn RevertVisitor) -> Result<()> {
        for (key, part) in &self.parts {
            match part {
                Part::AbsentFile => visitor.delete_file(key)?,
                Part::Keys(keys) => visitor.update_document(
                    key,
                    RevertOps {
                        inner: keys.iter(),
                    },
                )?,
            }
        }
        Ok(())
    }
}
