//! CLI command implementations.

pub mod exec_unit;
pub mod list;
pub mod run;
pub mod validate;

use scale_probe::KubectlClient;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::SuiteConfig;

/// Directory holding `sanity.toml` / `full.toml`.
pub fn config_dir(suite_dir: &Path) -> PathBuf {
    suite_dir.join("config")
}

/// Cluster client from the engine section.
pub fn kubectl(config: &SuiteConfig) -> KubectlClient {
    let client = KubectlClient::new()
        .with_binary(config.engine.kubectl.clone())
        .with_timeout(Duration::from_secs(config.engine.kubectl_timeout_secs));
    match &config.engine.kubeconfig {
        Some(path) => client.with_kubeconfig(path.clone()),
        None => client,
    }
}
