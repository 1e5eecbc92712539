//! Closed set of state checks.
//!
//! Every check follows the same phase sequence:
//!
//! ```text
//! discovery ─► spec ─► guest (sampled, remote) ─► workload signature
//!     │          │           │
//!    FAIL       FAIL        FAIL ─► stop
//!                            SKIP ─► dependent phases SKIP
//! ```
//!
//! A FAIL stops the check. Remote execution being unavailable turns guest
//! phases into SKIP, which never fails the report.

mod cpu;
mod lifecycle;
mod memory;
mod network;
mod storage;

use scale_core::{select_sample, PhaseLog, RetryPolicy, RetryVerdict, SamplingConfig};
use scale_types::{Status, UnitRef, ValidationOutcome, ValidationReport};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::clock::Clock;
use crate::cluster::{ClusterClient, Scope};
use crate::error::StoreError;
use crate::remote::RemoteExec;
use crate::sampling::probe_with_retries;
use crate::{retry, store};

/// How many offending units are named in a phase message.
const MAX_LISTED: usize = 5;

/// Check name not in the closed set.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown check '{0}'")]
pub struct UnknownCheck(pub String);

/// The checks this suite knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckKind {
    /// Every VMI is Running; sampled guests answer over SSH.
    Running,
    /// Declared and guest-visible vCPU count.
    Cpu,
    /// Declared and guest-visible memory (15 % band).
    Memory,
    /// Data disk size, guest block device size (5 % band), mount.
    Disk,
    /// Hotplugged volumes attached and visible in the guest.
    Hotplug,
    /// Interface count, declared and guest-visible.
    Nic,
    /// Data volume capacity after an online resize.
    Resize,
    /// VMs halted and no VMIs left.
    Shutdown,
}

impl CheckKind {
    /// Every check, in CLI listing order.
    pub const ALL: [CheckKind; 8] = [
        CheckKind::Running,
        CheckKind::Cpu,
        CheckKind::Memory,
        CheckKind::Disk,
        CheckKind::Hotplug,
        CheckKind::Nic,
        CheckKind::Resize,
        CheckKind::Shutdown,
    ];

    /// CLI and report name.
    pub fn name(&self) -> &'static str {
        match self {
            CheckKind::Running => "running",
            CheckKind::Cpu => "cpu",
            CheckKind::Memory => "memory",
            CheckKind::Disk => "disk",
            CheckKind::Hotplug => "hotplug",
            CheckKind::Nic => "nic",
            CheckKind::Resize => "resize",
            CheckKind::Shutdown => "shutdown",
        }
    }

    /// Run every phase once and build the report.
    pub async fn run(&self, ctx: &CheckContext, params: &CheckParams) -> ValidationReport {
        let mut log = PhaseLog::new();
        match self {
            CheckKind::Running => lifecycle::running(ctx, params, &mut log).await,
            CheckKind::Cpu => cpu::run(ctx, params, &mut log).await,
            CheckKind::Memory => memory::run(ctx, params, &mut log).await,
            CheckKind::Disk => storage::disk(ctx, params, &mut log).await,
            CheckKind::Hotplug => storage::hotplug(ctx, params, &mut log).await,
            CheckKind::Nic => network::run(ctx, params, &mut log).await,
            CheckKind::Resize => storage::resize(ctx, params, &mut log).await,
            CheckKind::Shutdown => lifecycle::shutdown(ctx, params, &mut log).await,
        }
        log.into_report(
            &ctx.test_name,
            self.name(),
            ctx.scope.label(),
            params.to_parameters(ctx),
        )
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CheckKind {
    type Err = UnknownCheck;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CheckKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| UnknownCheck(s.to_string()))
    }
}

/// Expected values for a check. Unset values skip the phases that need them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckParams {
    /// Expected population size.
    pub expected_count: Option<usize>,
    /// Expected vCPUs (cores × sockets × threads).
    pub expected_cores: Option<u32>,
    /// Expected memory as a quantity string.
    pub expected_memory: Option<String>,
    /// Expected data disk size as a quantity string.
    pub expected_disk: Option<String>,
    /// Expected interface count.
    pub expected_nics: Option<usize>,
    /// Expected hotplugged volume count per VMI.
    pub expected_hotplug: Option<usize>,
    /// Guest block device of the data disk.
    pub disk_device: String,
    /// Name fragment identifying data volumes (and their PVCs).
    pub data_volume: String,
    /// Background process expected in the guest.
    pub process: Option<String>,
    /// Mount point expected in the guest.
    pub mount: Option<String>,
}

impl Default for CheckParams {
    fn default() -> Self {
        Self {
            expected_count: None,
            expected_cores: None,
            expected_memory: None,
            expected_disk: None,
            expected_nics: None,
            expected_hotplug: None,
            disk_device: "/dev/vdb".to_string(),
            data_volume: "data".to_string(),
            process: None,
            mount: None,
        }
    }
}

impl CheckParams {
    fn to_parameters(&self, ctx: &CheckContext) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("selector".into(), ctx.selector.clone().into());
        map.insert("sampling_percentage".into(), ctx.sampling.percentage().into());
        map.insert("max_ssh_retries".into(), ctx.sampling.max_retries().into());
        let optional: [(&str, Option<Value>); 8] = [
            ("expected_count", self.expected_count.map(Value::from)),
            ("expected_cores", self.expected_cores.map(Value::from)),
            ("expected_memory", self.expected_memory.clone().map(Value::from)),
            ("expected_disk", self.expected_disk.clone().map(Value::from)),
            ("expected_nics", self.expected_nics.map(Value::from)),
            ("expected_hotplug", self.expected_hotplug.map(Value::from)),
            ("process", self.process.clone().map(Value::from)),
            ("mount", self.mount.clone().map(Value::from)),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                map.insert(key.into(), value);
            }
        }
        map.insert("disk_device".into(), self.disk_device.clone().into());
        map.insert("data_volume".into(), self.data_volume.clone().into());
        map
    }
}

/// Collaborators and scope shared by every phase of a check.
#[derive(Clone)]
pub struct CheckContext {
    /// Test the report is written for.
    pub test_name: String,
    /// Namespace scope of discovery.
    pub scope: Scope,
    /// Label selector identifying the population.
    pub selector: String,
    /// Control-plane client.
    pub cluster: Arc<dyn ClusterClient>,
    /// Guest command executor; `None` when no credentials are configured.
    pub remote: Option<Arc<dyn RemoteExec>>,
    /// Source of waits.
    pub clock: Arc<dyn Clock>,
    /// Guest sampling parameters.
    pub sampling: SamplingConfig,
}

impl CheckContext {
    fn sample(&self, units: &[UnitRef]) -> Vec<UnitRef> {
        select_sample(units, self.sampling.percentage(), &mut rand::thread_rng())
    }
}

/// Result of a retried check.
#[derive(Debug, Clone)]
pub struct ValidationRun {
    /// Retry verdict.
    pub verdict: RetryVerdict,
    /// Report of the last attempt, read back from disk.
    pub report: ValidationReport,
    /// Where the report lives.
    pub report_path: PathBuf,
}

/// Run `kind` under `policy`, writing the report on every attempt.
///
/// Each attempt overwrites `validation-<test>.json`; the file left after the
/// last attempt is the authoritative one and is what gets returned.
pub async fn run_validation(
    kind: CheckKind,
    ctx: &CheckContext,
    params: &CheckParams,
    policy: &RetryPolicy,
    results_dir: &Path,
) -> Result<ValidationRun, StoreError> {
    tracing::info!(
        check = kind.name(),
        test = %ctx.test_name,
        namespace = ctx.scope.label(),
        selector = %ctx.selector,
        "starting validation"
    );

    let verdict = retry::retry(policy, ctx.clock.as_ref(), |attempt| async move {
        let report = kind.run(ctx, params).await;
        tracing::info!(
            check = kind.name(),
            attempt,
            status = %report.overall_status,
            "check attempt finished"
        );
        store::write_report(results_dir, &report).await?;
        Ok::<bool, StoreError>(report.is_success())
    })
    .await?;

    let report_path = store::report_path(results_dir, &ctx.test_name);
    let report = store::read_json(&report_path).await?;
    Ok(ValidationRun {
        verdict,
        report,
        report_path,
    })
}

// ============================================================================
// Shared phase helpers
// ============================================================================

/// List `kind` objects and check the population size.
///
/// Returns the discovery outcome and the objects found.
async fn discover(
    ctx: &CheckContext,
    params: &CheckParams,
    kind: &str,
) -> (ValidationOutcome, Vec<Value>) {
    let started = Instant::now();
    let items = match ctx.cluster.list(kind, &ctx.scope, &ctx.selector).await {
        Ok(items) => items,
        Err(e) => {
            let outcome = ValidationOutcome::fail("discovery", format!("listing {} failed: {}", kind, e));
            return (outcome.with_duration(started.elapsed()), Vec::new());
        }
    };

    let outcome = if items.is_empty() {
        ValidationOutcome::fail(
            "discovery",
            format!("no {} objects match selector '{}'", kind, ctx.selector),
        )
    } else {
        match params.expected_count {
            Some(expected) if expected != items.len() => ValidationOutcome::fail(
                "discovery",
                format!("found {} {} objects, expected {}", items.len(), kind, expected),
            ),
            _ => ValidationOutcome::pass("discovery", format!("found {} {} objects", items.len(), kind)),
        }
    };

    let outcome = outcome
        .with_extra("kind", kind)
        .with_extra("count", items.len())
        .with_duration(started.elapsed());
    (outcome, items)
}

/// `namespace/name` of an object.
fn unit_of(ctx: &CheckContext, obj: &Value) -> Option<UnitRef> {
    let name = obj.pointer("/metadata/name")?.as_str()?;
    let namespace = obj
        .pointer("/metadata/namespace")
        .and_then(Value::as_str)
        .or(match &ctx.scope {
            Scope::Namespace(ns) => Some(ns.as_str()),
            Scope::AllNamespaces => None,
        })
        .unwrap_or("default");
    Some(UnitRef::new(namespace, name))
}

fn units_of(ctx: &CheckContext, items: &[Value]) -> Vec<UnitRef> {
    items.iter().filter_map(|obj| unit_of(ctx, obj)).collect()
}

fn display_name(ctx: &CheckContext, obj: &Value) -> String {
    unit_of(ctx, obj)
        .map(|u| u.to_string())
        .unwrap_or_else(|| "<unnamed>".to_string())
}

/// Spec phase comparing one declared value per object.
///
/// `judge` returns `Ok(())` when the object matches, `Err(observed)` when
/// it does not.
fn compare_phase<F>(ctx: &CheckContext, phase: &str, items: &[Value], what: &str, judge: F) -> ValidationOutcome
where
    F: Fn(&Value) -> Result<(), String>,
{
    let started = Instant::now();
    let mismatches: Vec<String> = items
        .iter()
        .filter_map(|obj| {
            judge(obj)
                .err()
                .map(|observed| format!("{}: {}", display_name(ctx, obj), observed))
        })
        .collect();

    let outcome = if mismatches.is_empty() {
        ValidationOutcome::pass(phase, format!("all {} objects have {}", items.len(), what))
    } else {
        ValidationOutcome::fail(
            phase,
            format!(
                "{}/{} objects do not have {}: {}",
                mismatches.len(),
                items.len(),
                what,
                list_some(&mismatches)
            ),
        )
    };
    outcome
        .with_extra("checked", items.len())
        .with_extra("mismatched", mismatches.len())
        .with_duration(started.elapsed())
}

/// Why a guest answer was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Rejected {
    /// The answer disagrees with the declared value.
    Mismatch(String),
    /// The answer carries no usable number.
    Unparseable(String),
}

impl From<String> for Rejected {
    fn from(observed: String) -> Self {
        Rejected::Mismatch(observed)
    }
}

/// Guest phase: run `command` on every sampled unit and judge its output.
///
/// Units that never answer, or answer with something unparseable, are soft
/// failures (PARTIAL); answers that do not match are hard failures (FAIL).
/// If no unit gives a usable answer, or there is no remote executor, the
/// phase is SKIP.
async fn guest_phase<F>(
    ctx: &CheckContext,
    phase: &str,
    sample: &[UnitRef],
    command: &str,
    judge: F,
) -> ValidationOutcome
where
    F: Fn(&str) -> Result<(), Rejected>,
{
    let started = Instant::now();
    let Some(remote) = ctx.remote.as_ref() else {
        return ValidationOutcome::skip(phase, "remote execution unavailable: no guest credentials");
    };
    if sample.is_empty() {
        return ValidationOutcome::skip(phase, "guest validation disabled (0% sampling)");
    }

    let mut answered = 0usize;
    let mut mismatches = Vec::new();
    let mut unparseable = Vec::new();
    let mut unreachable = Vec::new();

    for unit in sample {
        let output = probe_with_retries(&ctx.sampling, ctx.clock.as_ref(), |attempt| async move {
            match remote.run(unit, command).await {
                Ok(out) => Some(out),
                Err(e) => {
                    tracing::debug!(%unit, attempt, "remote command failed: {}", e);
                    None
                }
            }
        })
        .await;

        match output {
            Some(out) => {
                answered += 1;
                match judge(&out) {
                    Ok(()) => {}
                    Err(Rejected::Mismatch(observed)) => mismatches.push(format!("{}: {}", unit, observed)),
                    Err(Rejected::Unparseable(observed)) => {
                        tracing::warn!(%unit, phase, "cannot parse guest output: {}", observed);
                        unparseable.push(format!("{}: {}", unit, observed));
                    }
                }
            }
            None => {
                tracing::warn!(%unit, phase, "unit unreachable after all retries");
                unreachable.push(unit.to_string());
            }
        }
    }

    let outcome = if !mismatches.is_empty() {
        ValidationOutcome::fail(
            phase,
            format!(
                "{}/{} answering units mismatched: {}",
                mismatches.len(),
                answered,
                list_some(&mismatches)
            ),
        )
    } else if answered == 0 {
        ValidationOutcome::skip(
            phase,
            format!("remote execution unavailable: none of {} sampled units answered", sample.len()),
        )
    } else if answered == unparseable.len() {
        ValidationOutcome::skip(phase, format!("cannot parse guest output: {}", list_some(&unparseable)))
    } else if !unreachable.is_empty() || !unparseable.is_empty() {
        ValidationOutcome::partial(
            phase,
            format!(
                "{}/{} sampled units verified, {} unreachable, {} unparseable",
                answered - unparseable.len(),
                sample.len(),
                unreachable.len(),
                unparseable.len()
            ),
        )
    } else {
        ValidationOutcome::pass(phase, format!("{}/{} sampled units verified", answered, sample.len()))
    };

    outcome
        .with_extra("sample_size", sample.len())
        .with_extra("answered", answered)
        .with_extra("mismatched", mismatches.len())
        .with_extra("unparseable", unparseable.len())
        .with_extra(
            "unreachable_units",
            Value::Array(unreachable.into_iter().map(Value::String).collect()),
        )
        .with_duration(started.elapsed())
}

/// Guest phase that depends on an earlier guest phase having reached the units.
async fn dependent_guest_phase<F>(
    ctx: &CheckContext,
    phase: &str,
    prior: Option<Status>,
    sample: &[UnitRef],
    command: &str,
    judge: F,
) -> ValidationOutcome
where
    F: Fn(&str) -> Result<(), Rejected>,
{
    if prior == Some(Status::Skip) {
        return ValidationOutcome::skip(phase, "remote execution unavailable");
    }
    guest_phase(ctx, phase, sample, command, judge).await
}

/// Record a guest phase and remember its status for dependents.
fn record_guest(log: &mut PhaseLog, outcome: ValidationOutcome) -> (bool, Status) {
    let status = outcome.status;
    (log.record(outcome), status)
}

fn list_some(items: &[String]) -> String {
    let mut shown = items.iter().take(MAX_LISTED).cloned().collect::<Vec<_>>().join(", ");
    if items.len() > MAX_LISTED {
        shown.push_str(&format!(" (+{} more)", items.len() - MAX_LISTED));
    }
    shown
}

/// Single-quote a value for a POSIX shell.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Parse the first whitespace-separated token of command output as a number.
fn parse_count(output: &str) -> Result<u64, Rejected> {
    output
        .split_whitespace()
        .next()
        .ok_or_else(|| Rejected::Unparseable("empty output".to_string()))?
        .parse()
        .map_err(|_| Rejected::Unparseable(format!("unexpected output '{}'", output.trim())))
}

/// Optional process-signature phase shared by workload-bearing checks.
async fn process_signature(
    ctx: &CheckContext,
    params: &CheckParams,
    log: &mut PhaseLog,
    prior: Status,
    sample: &[UnitRef],
) {
    let Some(process) = &params.process else {
        return;
    };
    let command = format!("pgrep -fc {} || true", shell_quote(process));
    let outcome = dependent_guest_phase(ctx, "workload_process", Some(prior), sample, &command, |out| {
        match parse_count(out)? {
            0 => Err(format!("process '{}' not running", process).into()),
            _ => Ok(()),
        }
    })
    .await;
    log.record(outcome);
}
