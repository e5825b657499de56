//! Capability objects handed to amenders.
//!
//! An amender never touches a [`Document`] directly. Every write goes
//! through `set_attribute`, which records the original value in the revert
//! ledger before mutating, and every read returns an owned copy.

use std::path::Path;

use indexmap::IndexMap;
use serde_json::Value;

use crate::audit::{LogTag, loggable_json_value};
use crate::document::Document;
use crate::error::{AmendError, Result};
use crate::ledger::{LEDGER_KEY, Ledger, Part};
use crate::subpath::{ROOT_KEY, SubDir};

/// A sub-document opened during a session, keyed by its ledger key.
#[derive(Debug)]
pub(crate) struct OpenSubDocument {
    pub(crate) document: Document,
    pub(crate) existed_before: bool,
}

pub(crate) type SubDocuments = IndexMap<String, OpenSubDocument>;

fn set_recorded(tag: LogTag, part: &mut Part, document: &mut Document, key: &str, value: Value) {
    part.record_if_absent(document.content(), key);
    tracing::info!(
        "{tag} set_attr: \"{key}\": {}",
        loggable_json_value(Some(&value))
    );
    document.insert(key, value);
}

fn check_version(package: &str, document: &Document, expected: &str) -> Result<()> {
    let found = match document.get("version") {
        Some(Value::String(found)) if found == expected => return Ok(()),
        Some(Value::String(found)) => found.clone(),
        other => loggable_json_value(other),
    };
    Err(AmendError::VersionMismatch {
        package: package.to_string(),
        expected: expected.to_string(),
        found,
    })
}

/// Capability API bound to the root manifest of one package directory.
pub struct PackagePatcher<'a> {
    package: &'a str,
    package_dir: &'a Path,
    tag: LogTag,
    root: &'a mut Document,
    ledger: &'a mut Ledger,
    sub_documents: &'a mut SubDocuments,
}

impl<'a> PackagePatcher<'a> {
    pub(crate) fn new(
        package: &'a str,
        package_dir: &'a Path,
        tag: LogTag,
        root: &'a mut Document,
        ledger: &'a mut Ledger,
        sub_documents: &'a mut SubDocuments,
    ) -> Self {
        Self {
            package,
            package_dir,
            tag,
            root,
            ledger,
            sub_documents,
        }
    }

    /// Name the package was registered under.
    pub fn package_name(&self) -> &str {
        self.package
    }

    /// Replace the top-level `key` of `package.json` with `value`.
    pub fn set_attribute(&mut self, key: &str, value: Value) -> Result<()> {
        if key == LEDGER_KEY {
            return Err(AmendError::ReservedKey(key.to_string()));
        }
        let part = self.ledger.register_part(ROOT_KEY, true);
        set_recorded(self.tag, part, self.root, key, value);
        Ok(())
    }

    /// Copy of the current value of `key`, including earlier amendments
    /// made in this session.
    pub fn get_attribute_clone(&self, key: &str) -> Option<Value> {
        if key == LEDGER_KEY {
            return None;
        }
        self.root.get(key).cloned()
    }

    /// The `version` field of `package.json`.
    pub fn get_version(&self) -> Option<&str> {
        self.root.version()
    }

    /// Fail unless `package.json` declares exactly `expected` as its version.
    pub fn expect_version(&self, expected: &str) -> Result<()> {
        check_version(self.package, self.root, expected)
    }

    /// Create or update `<package>/<segments...>/package.json`.
    ///
    /// The directory must already exist. The sub-document is written back
    /// when the run commits, whether or not `sub_amender` changed it.
    pub fn ensure_sub_document<I, S, F>(&mut self, segments: I, sub_amender: F) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(&mut SubDocumentPatcher<'_>) -> Result<()>,
    {
        let sub_dir = SubDir::new(segments)?;
        let dir = sub_dir.dir_in(self.package_dir);
        if !dir.exists() {
            return Err(AmendError::SubDirectoryMissing(dir));
        }
        if !dir.is_dir() {
            return Err(AmendError::NotADirectory(dir));
        }

        let key = sub_dir.manifest_key();
        if !self.sub_documents.contains_key(&key) {
            let manifest = sub_dir.manifest_in(self.package_dir);
            let existed_before = manifest.is_file();
            let document = if existed_before {
                tracing::info!("{} will_update: {}", self.tag, manifest.display());
                Document::load(&manifest)?
            } else {
                tracing::info!("{} will_create: {}", self.tag, manifest.display());
                Document::empty(&manifest)
            };
            self.sub_documents.insert(
                key.clone(),
                OpenSubDocument {
                    document,
                    existed_before,
                },
            );
        }

        let Some(open) = self.sub_documents.get_mut(&key) else {
            return Err(AmendError::SubDirectoryMissing(dir));
        };
        let part = self.ledger.register_part(&key, open.existed_before);
        let mut patcher = SubDocumentPatcher {
            package: self.package,
            tag: self.tag,
            document: &mut open.document,
            part,
        };
        sub_amender(&mut patcher)
    }
}

/// Capability API bound to one sub-document. It cannot open further
/// sub-documents, which bounds nesting at one level.
pub struct SubDocumentPatcher<'a> {
    package: &'a str,
    tag: LogTag,
    document: &'a mut Document,
    part: &'a mut Part,
}

impl SubDocumentPatcher<'_> {
    pub fn set_attribute(&mut self, key: &str, value: Value) -> Result<()> {
        set_recorded(self.tag, self.part, self.document, key, value);
        Ok(())
    }

    pub fn get_attribute_clone(&self, key: &str) -> Option<Value> {
        self.document.get(key).cloned()
    }

    pub fn get_version(&self) -> Option<&str> {
        self.document.version()
    }

    pub fn expect_version(&self, expected: &str) -> Result<()> {
        check_version(self.package, self.document, expected)
    }

    pub fn path(&self) -> &Path {
        self.document.path()
    }
}
