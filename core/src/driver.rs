//! Top-level orchestration of one amend or revert run.
//!
//! A run has three phases:
//!
//! 1. **Resolve**: every target package name is located concurrently and the
//!    resulting directories are deduplicated.
//! 2. **Plan**: one [`PatchSession`] per directory runs on a blocking worker.
//!    Sessions only read from disk.
//! 3. **Commit**: if every session succeeded, their planned entries are
//!    executed together (or only logged in dry-run mode).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use indexmap::map::Entry;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub use crate::audit::Mode;
use crate::commit::{CommitBatch, CommitEntry, CommitReport};
use crate::error::{AmendError, Result};
use crate::locator::PackageLocator;
use crate::registry::AmenderRegistry;
use crate::session::PatchSession;

/// Options for a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Packages to process. Empty means every registered package.
    pub packages: Vec<String>,
    pub mode: Mode,
    /// Plan and log everything, write nothing.
    pub dry_run: bool,
    /// Stop at the first failing session instead of waiting for the rest.
    pub fail_fast: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            packages: Vec::new(),
            mode: Mode::Apply,
            dry_run: false,
            fail_fast: true,
        }
    }
}

/// One package directory to open a session for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub package: String,
    pub dir: PathBuf,
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub packages: Vec<String>,
    pub targets: Vec<Target>,
    pub report: CommitReport,
}

impl RunSummary {
    /// True when no package directory needed any change.
    pub fn is_noop(&self) -> bool {
        self.report == CommitReport::default()
    }
}

pub struct Driver {
    registry: Arc<AmenderRegistry>,
    locator: Arc<dyn PackageLocator>,
}

impl Driver {
    pub fn new(registry: AmenderRegistry, locator: impl PackageLocator + 'static) -> Self {
        Self {
            registry: Arc::new(registry),
            locator: Arc::new(locator),
        }
    }

    pub async fn run(&self, options: &RunOptions) -> Result<RunSummary> {
        let packages = self.target_packages(&options.packages)?;
        tracing::info!("[target_packages]: {}", packages.join(", "));

        let targets = self.resolve_targets(&packages).await?;
        let batch = self.plan(&targets, options).await?;

        let mut summary = RunSummary {
            packages,
            targets,
            report: CommitReport::default(),
        };
        if batch.is_empty() {
            tracing::info!(
                "Nothing to modify. Please check that whether the config is correct, or whether packages are installed."
            );
            return Ok(summary);
        }

        tracing::info!("Writing ...");
        summary.report = batch.commit().await?;
        tracing::info!("Write done.");
        Ok(summary)
    }

    /// Validate `requested` against the registry. No names selects every
    /// registered package in registration order.
    pub fn target_packages(&self, requested: &[String]) -> Result<Vec<String>> {
        if self.registry.is_empty() {
            return Err(AmendError::NoAmendersRegistered);
        }
        if requested.is_empty() {
            return Ok(self.registry.names().map(str::to_string).collect());
        }

        let mut packages: Vec<String> = Vec::with_capacity(requested.len());
        for name in requested {
            if !self.registry.contains(name) {
                return Err(AmendError::UnknownPackage(name.clone()));
            }
            if !packages.contains(name) {
                packages.push(name.clone());
            }
        }
        Ok(packages)
    }

    /// Locate every package concurrently and deduplicate the directories.
    ///
    /// A directory listed twice for the same package is opened once. A
    /// directory claimed by two different packages is an error, since both
    /// amenders would plan conflicting writes to one manifest.
    pub async fn resolve_targets(&self, packages: &[String]) -> Result<Vec<Target>> {
        let located = futures::future::try_join_all(
            packages.iter().map(|package| self.locator.locate(package)),
        )
        .await?;

        let mut owners: IndexMap<PathBuf, String> = IndexMap::new();
        for (package, dirs) in packages.iter().zip(located) {
            if dirs.is_empty() {
                tracing::info!(package = %package, "package is not installed");
            }
            for dir in dirs {
                match owners.entry(canonical_dir(&dir)) {
                    Entry::Vacant(slot) => {
                        slot.insert(package.clone());
                    }
                    Entry::Occupied(slot) if slot.get() == package => {
                        tracing::debug!(
                            package = %package,
                            "skipping duplicate directory {}",
                            slot.key().display()
                        );
                    }
                    Entry::Occupied(slot) => {
                        return Err(AmendError::DuplicateDirectory {
                            path: slot.key().clone(),
                            first: slot.get().clone(),
                            second: package.clone(),
                        });
                    }
                }
            }
        }

        Ok(owners
            .into_iter()
            .map(|(dir, package)| Target { package, dir })
            .collect())
    }

    /// Run one session per target and collect their commit entries in
    /// target order.
    pub async fn plan(&self, targets: &[Target], options: &RunOptions) -> Result<CommitBatch> {
        let cancel = CancellationToken::new();
        let mut sessions: JoinSet<(usize, Result<Vec<CommitEntry>>)> = JoinSet::new();

        for (index, target) in targets.iter().enumerate() {
            let session = PatchSession::new(target.package.clone(), target.dir.clone())
                .dry_run(options.dry_run)
                .with_cancellation(cancel.clone());
            match options.mode {
                Mode::Apply => {
                    let amender = self
                        .registry
                        .get(&target.package)
                        .ok_or_else(|| AmendError::UnknownPackage(target.package.clone()))?;
                    sessions.spawn_blocking(move || (index, session.apply(amender.as_ref())));
                }
                Mode::Revert => {
                    sessions.spawn_blocking(move || (index, session.revert()));
                }
            }
        }

        let mut planned: Vec<(usize, Vec<CommitEntry>)> = Vec::with_capacity(targets.len());
        let mut first_error: Option<AmendError> = None;
        while let Some(joined) = sessions.join_next().await {
            let (index, result) = match joined {
                Ok(done) => done,
                Err(join_error) => {
                    let err = AmendError::from(join_error);
                    tracing::error!("{err}");
                    if options.fail_fast {
                        cancel.cancel();
                        return Err(err);
                    }
                    first_error.get_or_insert(err);
                    continue;
                }
            };

            match result {
                Ok(entries) => planned.push((index, entries)),
                Err(AmendError::Cancelled) => {}
                Err(err) => {
                    let target = &targets[index];
                    tracing::error!(
                        package = %target.package,
                        dir = %target.dir.display(),
                        "{err}"
                    );
                    if options.fail_fast {
                        cancel.cancel();
                        return Err(err);
                    }
                    first_error.get_or_insert(err);
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        planned.sort_by_key(|(index, _)| *index);
        let mut batch = CommitBatch::new(options.dry_run);
        batch.extend(planned.into_iter().flat_map(|(_, entries)| entries));
        Ok(batch)
    }
}

/// Resolve symlinks so two spellings of one directory dedupe. A directory
/// that cannot be canonicalized is kept as given and fails later in its
/// session.
fn canonical_dir(dir: &Path) -> PathBuf {
    dunce::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf())
}
