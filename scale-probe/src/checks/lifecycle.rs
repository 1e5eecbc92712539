//! Running and shutdown checks.

use scale_core::PhaseLog;
use scale_types::ValidationOutcome;
use serde_json::Value;
use std::time::Instant;

use super::{compare_phase, discover, display_name, list_some, units_of, CheckContext, CheckParams};
use crate::sampling::validate_sample;

/// discovery(vmi) → vmi_running → ssh_sample (`echo ok`).
pub(super) async fn running(ctx: &CheckContext, params: &CheckParams, log: &mut PhaseLog) {
    let (outcome, vmis) = discover(ctx, params, "vmi").await;
    if !log.record(outcome) {
        return;
    }

    let outcome = compare_phase(ctx, "vmi_running", &vmis, "phase Running", |vmi| {
        match vmi.pointer("/status/phase").and_then(Value::as_str) {
            Some("Running") => Ok(()),
            Some(other) => Err(other.to_string()),
            None => Err("no phase".to_string()),
        }
    });
    if !log.record(outcome) {
        return;
    }

    let started = Instant::now();
    let units = units_of(ctx, &vmis);
    let remote = ctx.remote.clone();
    let report = validate_sample(
        &units,
        &ctx.sampling,
        remote.is_some(),
        ctx.clock.as_ref(),
        |unit| {
            let remote = remote.clone();
            async move {
                match remote {
                    Some(remote) => remote
                        .run(&unit, "echo ok")
                        .await
                        .map(|out| out.trim() == "ok")
                        .unwrap_or(false),
                    None => false,
                }
            }
        },
    )
    .await;
    log.record(report.to_outcome("ssh_sample").with_duration(started.elapsed()));
}

/// discovery(vm) → vm_halted → no_vmis.
pub(super) async fn shutdown(ctx: &CheckContext, params: &CheckParams, log: &mut PhaseLog) {
    let (outcome, vms) = discover(ctx, params, "vm").await;
    if !log.record(outcome) {
        return;
    }

    let outcome = compare_phase(ctx, "vm_halted", &vms, "a halted run strategy", |vm| {
        let strategy = vm.pointer("/spec/runStrategy").and_then(Value::as_str);
        let running = vm.pointer("/spec/running").and_then(Value::as_bool);
        match (strategy, running) {
            (Some("Halted"), _) | (None, Some(false)) => Ok(()),
            (Some(other), _) => Err(format!("runStrategy {}", other)),
            (None, Some(true)) => Err("running: true".to_string()),
            (None, None) => Err("no run strategy".to_string()),
        }
    });
    if !log.record(outcome) {
        return;
    }

    let started = Instant::now();
    let outcome = match ctx.cluster.list("vmi", &ctx.scope, &ctx.selector).await {
        Ok(vmis) if vmis.is_empty() => ValidationOutcome::pass("no_vmis", "no VMIs remain"),
        Ok(vmis) => {
            let names: Vec<String> = vmis.iter().map(|v| display_name(ctx, v)).collect();
            ValidationOutcome::fail(
                "no_vmis",
                format!("{} VMIs still present: {}", names.len(), list_some(&names)),
            )
            .with_extra("remaining", names.len())
        }
        Err(e) => ValidationOutcome::fail("no_vmis", format!("listing vmi failed: {}", e)),
    };
    log.record(outcome.with_duration(started.elapsed()));
}
