//! Amend/revert engine for installed `package.json` manifests.
//!
//! Amenders edit manifests only through [`PackagePatcher`], which records
//! every original value in a revert ledger embedded in the root manifest.
//! A later revert run reads that ledger and restores each document exactly,
//! deleting the files the amendment created.
//!
//! Nothing is written until every package directory of a run has been
//! planned successfully; see [`Driver`].

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod audit;
pub mod commit;
pub mod config;
pub mod document;
pub mod driver;
pub mod error;
pub mod ledger;
pub mod locator;
pub mod patcher;
pub mod registry;
pub mod session;
pub mod subpath;

pub use commit::{CommitAction, CommitBatch, CommitEntry, CommitReport};
pub use config::{AmendConfig, PackageRule, SubDocumentRule};
pub use document::{Document, MANIFEST_FILE_NAME};
pub use driver::{Driver, Mode, RunOptions, RunSummary, Target};
pub use error::{AmendError, Result};
pub use ledger::{LEDGER_KEY, Ledger, Part, Recorded};
pub use locator::{NpmLsLocator, PackageLocator, StaticLocator};
pub use patcher::{PackagePatcher, SubDocumentPatcher};
pub use registry::{Amender, AmenderRegistry};
pub use session::PatchSession;
