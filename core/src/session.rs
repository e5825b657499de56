//! One apply-or-revert pass over one package directory.
//!
//! A session reads from disk but never writes: it returns the commit entries
//! it wants executed, and the driver hands them to the commit batch once
//! every session of the run has succeeded.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::audit::{LogTag, Mode, loggable_json_value};
use crate::commit::CommitEntry;
use crate::document::{Document, MANIFEST_FILE_NAME};
use crate::error::{AmendError, Result};
use crate::ledger::{Ledger, RevertOp, RevertOps, RevertVisitor};
use crate::patcher::{PackagePatcher, SubDocuments};
use crate::registry::Amender;
use crate::subpath::{ROOT_KEY, manifest_path_for_key};

/// Planning context for one resolved package directory.
#[derive(Debug, Clone)]
pub struct PatchSession {
    package: String,
    package_dir: PathBuf,
    dry_run: bool,
    cancel: CancellationToken,
}

impl PatchSession {
    pub fn new(package: impl Into<String>, package_dir: impl Into<PathBuf>) -> Self {
        Self {
            package: package.into(),
            package_dir: package_dir.into(),
            dry_run: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Only affects the log tag; planning is identical in dry-run mode.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Share the run's token so a failing sibling can stop this session
    /// before it starts.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn tag(&self, mode: Mode) -> LogTag {
        LogTag::new(mode, self.dry_run)
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(AmendError::Cancelled);
        }
        Ok(())
    }

    fn load_root(&self, tag: LogTag) -> Result<Document> {
        if !self.package_dir.is_dir() {
            return Err(AmendError::NotADirectory(self.package_dir.clone()));
        }
        let path = self.package_dir.join(MANIFEST_FILE_NAME);
        if !path.is_file() {
            return Err(AmendError::RootManifestMissing(self.package_dir.clone()));
        }
        let root = Document::load(&path)?;
        tracing::info!("{tag} will_update: {}", path.display());
        Ok(root)
    }

    /// Run `amender` against the package and plan the resulting writes.
    pub fn apply(&self, amender: &dyn Amender) -> Result<Vec<CommitEntry>> {
        self.check_cancelled()?;
        let tag = self.tag(Mode::Apply);
        let mut root = self.load_root(tag)?;

        let mut ledger = Ledger::open(&root)?;
        ledger.register_part(ROOT_KEY, true);
        let mut sub_documents = SubDocuments::new();
        {
            let mut patcher = PackagePatcher::new(
                &self.package,
                &self.package_dir,
                tag,
                &mut root,
                &mut ledger,
                &mut sub_documents,
            );
            amender.amend(&mut patcher)?;
        }
        ledger.store_into(&mut root)?;

        let mut entries = Vec::with_capacity(sub_documents.len() + 1);
        for open in sub_documents.into_values() {
            let label = if open.existed_before {
                format!("{tag} (update)")
            } else {
                format!("{tag} (create)")
            };
            entries.push(CommitEntry::write_json(open.document, label));
        }
        entries.push(CommitEntry::write_json(root, format!("{tag} update")));
        Ok(entries)
    }

    /// Plan the restoration of every document recorded in the ledger.
    /// A package without a ledger yields no entries.
    pub fn revert(&self) -> Result<Vec<CommitEntry>> {
        self.check_cancelled()?;
        let tag = self.tag(Mode::Revert);
        let mut root = self.load_root(tag)?;

        let Some(ledger) = Ledger::take_from(&mut root)? else {
            tracing::info!(
                "{tag} no revert ledger in {}, nothing to revert",
                root.path().display()
            );
            return Ok(Vec::new());
        };

        let mut entries = Vec::new();
        let mut planner = RevertPlanner {
            package_dir: &self.package_dir,
            tag,
            root: &mut root,
            entries: &mut entries,
        };
        ledger.perform_revert(&mut planner)?;

        entries.push(CommitEntry::write_json(root, format!("{tag} update")));
        Ok(entries)
    }
}

/// Turns ledger callbacks into commit entries instead of performing I/O.
struct RevertPlanner<'a> {
    package_dir: &'a Path,
    tag: LogTag,
    root: &'a mut Document,
    entries: &'a mut Vec<CommitEntry>,
}

fn apply_revert_ops(tag: LogTag, document: &mut Document, ops: RevertOps<'_>) {
    for op in ops {
        match op {
            RevertOp::Delete(key) => {
                document.remove(key);
                tracing::info!("{tag} delete_attr: \"{key}\"");
            }
            RevertOp::Set(key, original) => {
                tracing::info!(
                    "{tag} set_attr: \"{key}\": {}",
                    loggable_json_value(Some(original))
                );
                document.insert(key, original.clone());
            }
        }
    }
}

impl RevertVisitor for RevertPlanner<'_> {
    fn delete_file(&mut self, key: &str) -> Result<()> {
        if key == ROOT_KEY {
            tracing::warn!(
                "{} ledger marks the root manifest as created, keeping {}",
                self.tag,
                self.root.path().display()
            );
            return Ok(());
        }
        let path = manifest_path_for_key(self.package_dir, key)?;
        tracing::info!("{} will_delete: {}", self.tag, path.display());
        self.entries.push(CommitEntry::delete(path, self.tag.to_string()));
        Ok(())
    }

    fn update_document(&mut self, key: &str, ops: RevertOps<'_>) -> Result<()> {
        if key == ROOT_KEY {
            apply_revert_ops(self.tag, self.root, ops);
            return Ok(());
        }

        let path = manifest_path_for_key(self.package_dir, key)?;
        let mut document = if path.is_file() {
            Document::load(&path)?
        } else {
            tracing::warn!(
                "{} {} disappeared since it was patched, recreating it",
                self.tag,
                path.display()
            );
            Document::empty(&path)
        };
        tracing::info!("{} will_update: {}", self.tag, path.display());
        apply_revert_ops(self.tag, &mut document, ops);
        self.entries.push(CommitEntry::write_json(
            document,
            format!("{} (revert)", self.tag),
        ));
        Ok(())
    }
}
