//! Deferred file mutations.
//!
//! Sessions only plan. Every write and delete is queued here and executed
//! after all sessions of a run have finished planning, so a failing amender
//! never leaves a half-patched package behind. Failures during the commit
//! phase itself stop the batch; entries that already ran are not rolled back.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use serde_json::{Map, Value};

use crate::document::{Document, to_pretty_json};
use crate::error::{AmendError, Result};

/// Upper bound on entries executing at the same time.
pub const COMMIT_CONCURRENCY: usize = 16;

/// What to do with a target file.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitAction {
    WriteJson(Map<String, Value>),
    Delete,
}

/// One planned file mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitEntry {
    target: PathBuf,
    action: CommitAction,
    label: String,
}

impl CommitEntry {
    /// Write `document` back to its own path.
    pub fn write_json(document: Document, label: impl Into<String>) -> Self {
        Self {
            target: document.path().to_path_buf(),
            action: CommitAction::WriteJson(document.into_content()),
            label: label.into(),
        }
    }

    pub fn delete(target: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            action: CommitAction::Delete,
            label: label.into(),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn action(&self) -> &CommitAction {
        &self.action
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Counts of what a commit did (or, in dry-run mode, would have done).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub written: usize,
    pub deleted: usize,
    /// Deletes whose target was already gone.
    pub skipped: usize,
}

enum Outcome {
    Written,
    Deleted,
    Skipped,
}

/// Entries collected from every session of one run.
#[derive(Debug, Default)]
pub struct CommitBatch {
    entries: Vec<CommitEntry>,
    dry_run: bool,
}

impl CommitBatch {
    pub fn new(dry_run: bool) -> Self {
        Self {
            entries: Vec::new(),
            dry_run,
        }
    }

    pub fn push(&mut self, entry: CommitEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Execute every entry. The first failure stops the batch.
    pub async fn commit(self) -> Result<CommitReport> {
        let dry_run = self.dry_run;
        let mut outcomes = futures::stream::iter(
            self.entries
                .into_iter()
                .map(|entry| execute(entry, dry_run)),
        )
        .buffer_unordered(COMMIT_CONCURRENCY);

        let mut report = CommitReport::default();
        while let Some(outcome) = outcomes.next().await {
            match outcome? {
                Outcome::Written => report.written += 1,
                Outcome::Deleted => report.deleted += 1,
                Outcome::Skipped => report.skipped += 1,
            }
        }
        Ok(report)
    }
}

impl Extend<CommitEntry> for CommitBatch {
    fn extend<T: IntoIterator<Item = CommitEntry>>(&mut self, iter: T) {
        self.entries.extend(iter);
    }
}

async fn execute(entry: CommitEntry, dry_run: bool) -> Result<Outcome> {
    let CommitEntry {
        target,
        action,
        label,
    } = entry;
    match action {
        CommitAction::WriteJson(content) => {
            tracing::info!("{label} writing file: {}", target.display());
            if !dry_run {
                write_json(&target, &content).await?;
            }
            Ok(Outcome::Written)
        }
        CommitAction::Delete => {
            let is_file = tokio::fs::metadata(&target)
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false);
            if !is_file {
                tracing::debug!("{label} nothing to delete at {}", target.display());
                return Ok(Outcome::Skipped);
            }
            tracing::info!("{label} deleting file: {}", target.display());
            if !dry_run {
                tokio::fs::remove_file(&target)
                    .await
                    .map_err(|e| AmendError::io(&target, e))?;
            }
            Ok(Outcome::Deleted)
        }
    }
}

/// Atomically replace `path` via a `.tmp` sibling.
async fn write_json(path: &Path, content: &Map<String, Value>) -> Result<()> {
    let data = to_pretty_json(content).map_err(|source| AmendError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, data.as_bytes())
        .await
        .map_err(|e| AmendError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| AmendError::io(path, e))?;
    Ok(())
}
