//! Run a selection of tests and print the suite summary.

use anyhow::{Context, Result};
use scale_core::SuiteSummary;
use scale_probe::store;
use scale_types::Mode;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{config_dir, kubectl, list};
use crate::config::SuiteConfig;
use crate::orchestrator::{LabelTeardown, Orchestrator, ProcessLauncher, Strategy};
use crate::registry::Registry;

/// Options of the run command.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Test names, in execution order.
    pub tests: Vec<String>,
    /// Run every registered test.
    pub all: bool,
    /// Only list the registry.
    pub list: bool,
    /// Mode selecting config and override files.
    pub mode: Mode,
    /// Scheduling strategy.
    pub strategy: Strategy,
    /// Explicit config file replacing the mode file.
    pub config: Option<PathBuf>,
    /// Suite directory holding `registry.toml` and `config/`.
    pub suite_dir: PathBuf,
    /// Forwarded to execution units.
    pub verbose: bool,
}

/// `suite-summary-<ts>.json` contents.
#[derive(Debug, Serialize)]
struct SuiteSummaryFile<'a> {
    timestamp: String,
    mode: Mode,
    strategy: &'static str,
    passed: usize,
    total: usize,
    exit_code: i32,
    #[serde(flatten)]
    summary: &'a SuiteSummary,
}

/// Run the run command. Returns the suite exit code.
///
/// Registry, selection, per-test input files and configuration are all
/// resolved before anything is launched or written.
pub async fn run(opts: RunOptions) -> Result<i32> {
    let registry = Registry::load(&opts.suite_dir).context("cannot load test registry")?;
    if opts.list {
        print!("{}", list::render(&registry));
        return Ok(0);
    }

    let tests = registry.select(&opts.tests, opts.all)?;
    for test in &tests {
        test.check_inputs(opts.mode)?;
    }
    let config = SuiteConfig::resolve(&config_dir(&opts.suite_dir), opts.mode, opts.config.as_deref())?;
    tracing::debug!(?config, "resolved configuration");

    let exe = std::env::current_exe().context("cannot locate the scale-runner binary")?;
    let launcher = ProcessLauncher::new(exe, opts.suite_dir.clone())
        .with_config(opts.config.clone())
        .with_verbose(opts.verbose);
    let cleanup = LabelTeardown::new(Arc::new(kubectl(&config)), config.cleanup.enabled);
    let orchestrator = Orchestrator::new(
        Arc::new(launcher),
        Arc::new(cleanup),
        config.results.root.clone(),
        opts.mode,
    );

    let records = orchestrator.run(&tests, opts.strategy).await;
    let summary = SuiteSummary::from_records(&records);

    print!("{}", summary.render_table());
    for name in summary.failed_tests() {
        tracing::warn!(test = name, "test did not pass");
    }

    let path = write_summary(&config.results.root, opts.mode, opts.strategy, &summary).await?;
    tracing::info!(summary = %path.display(), "suite summary written");

    Ok(summary.exit_code())
}

async fn write_summary(
    results_root: &Path,
    mode: Mode,
    strategy: Strategy,
    summary: &SuiteSummary,
) -> Result<PathBuf> {
    let now = chrono::Utc::now();
    let path = results_root.join(format!("suite-summary-{}.json", now.format("%Y%m%d-%H%M%S")));
    let file = SuiteSummaryFile {
        timestamp: scale_types::now_rfc3339(),
        mode,
        strategy: match strategy {
            Strategy::Sequential => "sequential",
            Strategy::Concurrent => "concurrent",
        },
        passed: summary.rows.len() - summary.failed_tests().len(),
        total: summary.rows.len(),
        exit_code: summary.exit_code(),
        summary,
    };
    store::write_json_atomic(&path, &file)
        .await
        .context("cannot write suite summary")?;
    Ok(path)
}
