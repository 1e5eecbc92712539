//! Validate command: one retried check, one JSON report.
//!
//! Usually invoked by the engine as a post-workload hook. Configuration
//! comes from the environment exported by the execution unit, so expected
//! values not given on the command line fall back to the workload section.

use anyhow::{Context, Result};
use scale_core::RetryPolicy;
use scale_probe::{
    run_validation, CheckContext, CheckKind, CheckParams, Clock, RemoteExec, Scope, TokioClock,
    VirtctlSsh,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::kubectl;
use crate::config::SuiteConfig;

/// Options of the validate command.
#[derive(Debug, Clone)]
pub struct ValidateOptions {
    /// Check to run.
    pub check: CheckKind,
    /// Test the report belongs to; names `validation-<test>.json`.
    pub test_name: String,
    /// Namespace to inspect. Ignored with `all_namespaces`.
    pub namespace: Option<String>,
    /// Inspect every namespace.
    pub all_namespaces: bool,
    /// Label selector of the population.
    pub selector: String,
    /// Directory the report is written to.
    pub results_dir: PathBuf,
    /// Expected VM/VMI count; falls back to `workload.vm_count`.
    pub expected_count: Option<usize>,
    /// Expected vCPUs per VM; falls back to `workload.cpu_cores`.
    pub expected_cores: Option<u32>,
    /// Expected guest memory quantity; falls back to `workload.memory`.
    pub expected_memory: Option<String>,
    /// Expected data disk quantity; falls back to `workload.disk_size`.
    pub expected_disk: Option<String>,
    /// Expected interfaces per VM; falls back to `workload.nic_count`.
    pub expected_nics: Option<usize>,
    /// Expected hotplugged volumes per VMI.
    pub expected_hotplug: Option<usize>,
    /// Guest block device of the data disk.
    pub disk_device: Option<String>,
    /// Name fragment identifying data volumes and their PVCs.
    pub data_volume: Option<String>,
    /// Process expected to run in sampled guests.
    pub process: Option<String>,
    /// Mount point expected in sampled guests.
    pub mount: Option<String>,
    /// Run a single attempt instead of the configured retry policy.
    pub no_retry: bool,
    /// Config file; defaults plus environment when unset.
    pub config: Option<PathBuf>,
}

impl ValidateOptions {
    fn scope(&self) -> Scope {
        match (&self.namespace, self.all_namespaces) {
            (_, true) | (None, false) => Scope::AllNamespaces,
            (Some(ns), false) => Scope::Namespace(ns.clone()),
        }
    }

    fn params(&self, config: &SuiteConfig) -> CheckParams {
        let workload = &config.workload;
        let defaults = CheckParams::default();
        CheckParams {
            expected_count: self.expected_count.or(workload.vm_count),
            expected_cores: self.expected_cores.or(workload.cpu_cores),
            expected_memory: self.expected_memory.clone().or_else(|| workload.memory.clone()),
            expected_disk: self.expected_disk.clone().or_else(|| workload.disk_size.clone()),
            expected_nics: self.expected_nics.or(workload.nic_count),
            expected_hotplug: self.expected_hotplug,
            disk_device: self.disk_device.clone().unwrap_or(defaults.disk_device),
            data_volume: self.data_volume.clone().unwrap_or(defaults.data_volume),
            process: self.process.clone(),
            mount: self.mount.clone(),
        }
    }
}

/// Run the validate command. Returns the report's exit code.
pub async fn run(opts: ValidateOptions) -> Result<i32> {
    let config = SuiteConfig::from_env(opts.config.as_deref())?;
    let params = opts.params(&config);

    let remote = config.credentials().map(|credentials| {
        let ssh = VirtctlSsh::new(credentials, Duration::from_secs(config.ssh.connect_timeout_secs))
            .with_binary(config.ssh.virtctl.clone());
        Arc::new(ssh) as Arc<dyn RemoteExec>
    });
    if remote.is_none() {
        tracing::warn!("no guest credentials configured; guest phases will be skipped");
    }

    let ctx = CheckContext {
        test_name: opts.test_name.clone(),
        scope: opts.scope(),
        selector: opts.selector.clone(),
        cluster: Arc::new(kubectl(&config)),
        remote,
        clock: Arc::new(TokioClock) as Arc<dyn Clock>,
        sampling: config.sampling()?,
    };
    let policy = if opts.no_retry {
        RetryPolicy::single_attempt()
    } else {
        config.retry_policy()
    };

    let run = run_validation(opts.check, &ctx, &params, &policy, &opts.results_dir)
        .await
        .with_context(|| format!("cannot write validation report to {}", opts.results_dir.display()))?;

    println!(
        "{} {}: {} after {} attempt(s) ({})",
        opts.check,
        run.report.overall_status,
        run.verdict.message,
        run.verdict.attempts,
        run.report_path.display()
    );
    Ok(run.report.exit_code)
}
