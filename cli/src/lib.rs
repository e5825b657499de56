//! Library half of the `amend-package` binary: argument parsing and run
//! orchestration, kept out of `main.rs` so integration tests can drive it.

pub mod builtin;

use std::path::PathBuf;

use amend_core::AmendConfig;
use amend_core::AmendError;
use amend_core::AmenderRegistry;
use amend_core::Driver;
use amend_core::Mode;
use amend_core::NpmLsLocator;
use amend_core::RunOptions;
use anyhow::Context;
use clap::Parser;

/// Appended to errors caused by how the command was invoked.
pub const USAGE_HINT: &str = "Check --help for usage.";

/// Patch installed packages' package.json files and revert those patches.
///
/// Every change is recorded inside the package's own package.json so that
/// `--revert` can restore the original files exactly.
#[derive(Debug, Parser)]
#[command(name = "amend-package", version)]
pub struct Cli {
    /// Config file (.toml or .json) describing the amendments.
    #[arg(long, value_name = "PATH", conflicts_with = "builtin_config")]
    pub config: Option<PathBuf>,

    /// Use a config compiled into the binary, e.g. fix-echarts-esm.toml.
    #[arg(long, value_name = "NAME")]
    pub builtin_config: Option<String>,

    /// List the built-in configs and exit.
    #[arg(long)]
    pub list_builtin_config: bool,

    /// Only process this package. Repeatable; defaults to every configured
    /// package. An empty name is ignored.
    #[arg(long = "package", value_name = "NAME")]
    pub packages: Vec<String>,

    /// Revert earlier modifications instead of applying them.
    #[arg(long, visible_aliases = ["reverse", "restore"])]
    pub revert: bool,

    /// Log what would change without writing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Let every package finish planning before reporting the first failure.
    /// Nothing is written either way.
    #[arg(long)]
    pub keep_going: bool,

    /// Project root in which `npm ls` is run. Defaults to the current
    /// directory.
    #[arg(short = 'C', long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,
}

impl Cli {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            packages: self
                .packages
                .iter()
                .filter(|name| !name.trim().is_empty())
                .cloned()
                .collect(),
            mode: if self.revert { Mode::Revert } else { Mode::Apply },
            dry_run: self.dry_run,
            fail_fast: !self.keep_going,
        }
    }
}

fn usage_error(message: impl std::fmt::Display) -> anyhow::Error {
    anyhow::anyhow!("{message}  {USAGE_HINT}")
}

fn run_error(err: AmendError) -> anyhow::Error {
    if err.is_usage_error() {
        usage_error(err)
    } else {
        err.into()
    }
}

/// Pick the config named on the command line, falling back to
/// [`AmendConfig::ENV_CONFIG_PATH`].
pub fn resolve_config(cli: &Cli) -> anyhow::Result<AmendConfig> {
    if let Some(path) = &cli.config {
        return AmendConfig::load_from_path(path)
            .with_context(|| format!("failed to load config {}", path.display()));
    }
    if let Some(name) = &cli.builtin_config {
        let builtin = builtin::find(name).ok_or_else(|| {
            usage_error(format!(
                "Unknown built-in config: {name}. Use --list-builtin-config to see them."
            ))
        })?;
        return builtin
            .load()
            .with_context(|| format!("built-in config {} is invalid", builtin.name));
    }
    AmendConfig::load_from_env()
        .with_context(|| format!("failed to load ${}", AmendConfig::ENV_CONFIG_PATH))?
        .ok_or_else(|| usage_error("Either --builtin-config or --config must be specified."))
}

fn print_builtin_configs() {
    println!("Built-in config file names:");
    println!();
    for name in builtin::names() {
        println!("  {name}");
    }
    println!();
    println!("Use --builtin-config <config_file_name> to use one of them.");
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.list_builtin_config {
        print_builtin_configs();
        return Ok(());
    }

    let config = resolve_config(&cli)?;
    let project_root = match &cli.cwd {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("failed to read the current directory")?,
    };
    tracing::debug!(project_root = %project_root.display(), "resolved project root");

    let driver = Driver::new(
        AmenderRegistry::from_config(&config),
        NpmLsLocator::new(project_root),
    );
    driver.run(&cli.run_options()).await.map_err(run_error)?;
    Ok(())
}
