//! Memory check: declared guest memory, then `/proc/meminfo` within 15 %.

use scale_core::{parse_quantity, within_tolerance, PhaseLog, MEMORY_TOLERANCE_PCT};
use scale_types::ValidationOutcome;
use serde_json::Value;
use std::time::Instant;

use super::{
    discover, display_name, guest_phase, list_some, process_signature, record_guest, units_of,
    CheckContext, CheckParams, Rejected,
};

/// Memory a VM template declares, preferring `domain.memory.guest`.
fn declared_memory(vm: &Value) -> Option<&str> {
    vm.pointer("/spec/template/spec/domain/memory/guest")
        .or_else(|| vm.pointer("/spec/template/spec/domain/resources/requests/memory"))
        .and_then(Value::as_str)
}

/// Bytes from a `MemTotal:  8012345 kB` line.
fn parse_meminfo(output: &str) -> Result<u64, Rejected> {
    let line = output
        .lines()
        .find(|l| l.starts_with("MemTotal:"))
        .ok_or_else(|| Rejected::Unparseable("no MemTotal line".to_string()))?;
    line.split_whitespace()
        .nth(1)
        .and_then(|v| v.parse::<u64>().ok())
        .and_then(|kib| kib.checked_mul(1024))
        .ok_or_else(|| Rejected::Unparseable(format!("unparseable '{}'", line.trim())))
}

pub(super) async fn run(ctx: &CheckContext, params: &CheckParams, log: &mut PhaseLog) {
    let (outcome, vms) = discover(ctx, params, "vm").await;
    if !log.record(outcome) {
        return;
    }

    let Some(raw) = params.expected_memory.as_deref() else {
        log.record(ValidationOutcome::skip("memory_spec", "no expected memory given"));
        return;
    };
    let expected = match parse_quantity(raw) {
        Ok(bytes) => bytes,
        Err(e) => {
            log.record(ValidationOutcome::skip(
                "memory_spec",
                format!("cannot parse expected memory '{}': {}", raw, e),
            ));
            return;
        }
    };

    let started = Instant::now();
    let mut mismatched = Vec::new();
    let mut unparseable = Vec::new();
    for vm in &vms {
        match declared_memory(vm).map(|d| (d, parse_quantity(d))) {
            Some((_, Ok(bytes))) if bytes == expected => {}
            Some((declared, Ok(_))) => mismatched.push(format!("{}: {}", display_name(ctx, vm), declared)),
            Some((declared, Err(_))) => unparseable.push(format!("{}: '{}'", display_name(ctx, vm), declared)),
            None => mismatched.push(format!("{}: no memory declared", display_name(ctx, vm))),
        }
    }
    let outcome = if !mismatched.is_empty() {
        ValidationOutcome::fail(
            "memory_spec",
            format!("{}/{} VMs do not declare {}: {}", mismatched.len(), vms.len(), raw, list_some(&mismatched)),
        )
    } else if !unparseable.is_empty() {
        ValidationOutcome::skip(
            "memory_spec",
            format!("cannot parse declared memory: {}", list_some(&unparseable)),
        )
    } else {
        ValidationOutcome::pass("memory_spec", format!("all {} VMs declare {}", vms.len(), raw))
    };
    if !log.record(outcome.with_extra("expected_bytes", expected).with_duration(started.elapsed())) {
        return;
    }

    let sample = ctx.sample(&units_of(ctx, &vms));
    let outcome = guest_phase(ctx, "memory_guest", &sample, "grep MemTotal /proc/meminfo", |out| {
        let observed = parse_meminfo(out)?;
        if within_tolerance(observed, expected, MEMORY_TOLERANCE_PCT) {
            Ok(())
        } else {
            Err(format!("guest has {} bytes", observed).into())
        }
    })
    .await;
    let (ok, status) = record_guest(log, outcome);
    if !ok {
        return;
    }

    process_signature(ctx, params, log, status, &sample).await;
}
