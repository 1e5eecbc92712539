//! Hidden `exec-unit` command: the body of one execution unit process.

use anyhow::{Context, Result};
use scale_types::Mode;
use std::path::{Path, PathBuf};

use super::config_dir;
use crate::config::SuiteConfig;
use crate::registry::Registry;
use crate::unit;

/// Run one test into `results_dir`. Exit code 0 when the record passes.
pub async fn run(
    test: &str,
    mode: Mode,
    results_dir: &Path,
    suite_dir: &Path,
    config: Option<PathBuf>,
) -> Result<i32> {
    let registry = Registry::load(suite_dir).context("cannot load test registry")?;
    let definition = registry.get(test)?;
    let config = SuiteConfig::resolve(&config_dir(suite_dir), mode, config.as_deref())?;

    let record = unit::run(definition, mode, results_dir, &config)
        .await
        .with_context(|| format!("cannot write execution record in {}", results_dir.display()))?;

    Ok(if record.passed() { 0 } else { 1 })
}
