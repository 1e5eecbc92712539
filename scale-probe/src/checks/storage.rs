//! Storage checks: data disk size, hotplugged volumes, online resize.

use scale_core::{parse_quantity, within_tolerance, PhaseLog, DISK_TOLERANCE_PCT};
use scale_types::{Status, ValidationOutcome};
use serde_json::Value;
use std::time::Instant;

use super::{
    compare_phase, dependent_guest_phase, discover, display_name, guest_phase, list_some,
    parse_count, record_guest, shell_quote, units_of, CheckContext, CheckParams, Rejected,
};

/// Parse the expected size or record why the check cannot go on.
fn expected_size(log: &mut PhaseLog, phase: &str, raw: Option<&str>) -> Option<u64> {
    let Some(raw) = raw else {
        log.record(ValidationOutcome::skip(phase, "no expected size given"));
        return None;
    };
    match parse_quantity(raw) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            log.record(ValidationOutcome::skip(
                phase,
                format!("cannot parse expected size '{}': {}", raw, e),
            ));
            None
        }
    }
}

/// Storage request of the VM's data volume template.
fn data_volume_request<'a>(vm: &'a Value, fragment: &str) -> Option<&'a str> {
    vm.pointer("/spec/dataVolumeTemplates")?
        .as_array()?
        .iter()
        .filter(|dv| {
            dv.pointer("/metadata/name")
                .and_then(Value::as_str)
                .is_some_and(|n| n.contains(fragment))
        })
        .find_map(|dv| {
            dv.pointer("/spec/storage/resources/requests/storage")
                .or_else(|| dv.pointer("/spec/pvc/resources/requests/storage"))
                .and_then(Value::as_str)
        })
}

fn block_size_judge(expected: u64) -> impl Fn(&str) -> Result<(), Rejected> {
    move |out| {
        let observed = parse_count(out)?;
        if within_tolerance(observed, expected, DISK_TOLERANCE_PCT) {
            Ok(())
        } else {
            Err(format!("device is {} bytes", observed).into())
        }
    }
}

/// discovery(vm) → disk_spec → disk_guest → disk_mount.
pub(super) async fn disk(ctx: &CheckContext, params: &CheckParams, log: &mut PhaseLog) {
    let (outcome, vms) = discover(ctx, params, "vm").await;
    if !log.record(outcome) {
        return;
    }
    let Some(expected) = expected_size(log, "disk_spec", params.expected_disk.as_deref()) else {
        return;
    };

    let started = Instant::now();
    let mut mismatched = Vec::new();
    let mut unparseable = Vec::new();
    for vm in &vms {
        match data_volume_request(vm, &params.data_volume).map(|raw| (raw, parse_quantity(raw))) {
            Some((_, Ok(bytes))) if bytes == expected => {}
            Some((raw, Ok(_))) => mismatched.push(format!("{}: {}", display_name(ctx, vm), raw)),
            Some((raw, Err(_))) => unparseable.push(format!("{}: '{}'", display_name(ctx, vm), raw)),
            None => mismatched.push(format!(
                "{}: no '{}' data volume",
                display_name(ctx, vm),
                params.data_volume
            )),
        }
    }
    let outcome = if !mismatched.is_empty() {
        ValidationOutcome::fail(
            "disk_spec",
            format!(
                "{}/{} VMs do not have the expected data volume size: {}",
                mismatched.len(),
                vms.len(),
                list_some(&mismatched)
            ),
        )
    } else if !unparseable.is_empty() {
        ValidationOutcome::skip(
            "disk_spec",
            format!("cannot parse data volume size: {}", list_some(&unparseable)),
        )
    } else {
        ValidationOutcome::pass("disk_spec", format!("all {} VMs have the expected data volume size", vms.len()))
    };
    let outcome = outcome
        .with_extra("checked", vms.len())
        .with_extra("mismatched", mismatched.len())
        .with_duration(started.elapsed());
    if !log.record(outcome) {
        return;
    }

    let sample = ctx.sample(&units_of(ctx, &vms));
    let command = format!("lsblk -b -dn -o SIZE {}", shell_quote(&params.disk_device));
    let outcome = guest_phase(ctx, "disk_guest", &sample, &command, block_size_judge(expected)).await;
    let (ok, status) = record_guest(log, outcome);
    if !ok {
        return;
    }

    if let Some(mount) = &params.mount {
        let command = format!("grep -c {} /proc/mounts || true", shell_quote(&format!(" {} ", mount)));
        let outcome = dependent_guest_phase(ctx, "disk_mount", Some(status), &sample, &command, |out| {
            match parse_count(out)? {
                0 => Err(format!("{} not mounted", mount).into()),
                _ => Ok(()),
            }
        })
        .await;
        log.record(outcome);
    }
}

fn attached_hotplug_volumes(vmi: &Value) -> usize {
    vmi.pointer("/status/volumeStatus")
        .and_then(Value::as_array)
        .map(|volumes| {
            volumes
                .iter()
                .filter(|v| v.get("hotplugVolume").is_some())
                .filter(|v| matches!(v.get("phase").and_then(Value::as_str), None | Some("Ready")))
                .count()
        })
        .unwrap_or(0)
}

/// discovery(vmi) → hotplug_attached → hotplug_guest.
pub(super) async fn hotplug(ctx: &CheckContext, params: &CheckParams, log: &mut PhaseLog) {
    let (outcome, vmis) = discover(ctx, params, "vmi").await;
    if !log.record(outcome) {
        return;
    }
    let Some(expected) = params.expected_hotplug else {
        log.record(ValidationOutcome::skip("hotplug_attached", "no expected volume count given"));
        return;
    };

    let what = format!("{} ready hotplug volumes", expected);
    let outcome = compare_phase(ctx, "hotplug_attached", &vmis, &what, |vmi| {
        match attached_hotplug_volumes(vmi) {
            n if n == expected => Ok(()),
            n => Err(format!("{} attached", n)),
        }
    });
    if !log.record(outcome) {
        return;
    }

    // Root disk plus every hotplugged volume.
    let minimum = expected as u64 + 1;
    let sample = ctx.sample(&units_of(ctx, &vmis));
    let outcome = guest_phase(
        ctx,
        "hotplug_guest",
        &sample,
        "lsblk -dn -o TYPE | grep -c '^disk' || true",
        |out| match parse_count(out)? {
            n if n >= minimum => Ok(()),
            n => Err(format!("guest sees {} disks, expected at least {}", n, minimum).into()),
        },
    )
    .await;
    log.record(outcome);
}

/// discovery(vm) → resize_capacity → resize_guest.
pub(super) async fn resize(ctx: &CheckContext, params: &CheckParams, log: &mut PhaseLog) {
    let (outcome, vms) = discover(ctx, params, "vm").await;
    if !log.record(outcome) {
        return;
    }
    let Some(expected) = expected_size(log, "resize_capacity", params.expected_disk.as_deref()) else {
        return;
    };

    let started = Instant::now();
    let outcome = match ctx.cluster.list("pvc", &ctx.scope, &ctx.selector).await {
        Err(e) => ValidationOutcome::fail("resize_capacity", format!("listing pvc failed: {}", e)),
        Ok(pvcs) => {
            let data: Vec<&Value> = pvcs
                .iter()
                .filter(|pvc| {
                    pvc.pointer("/metadata/name")
                        .and_then(Value::as_str)
                        .is_some_and(|n| n.contains(&params.data_volume))
                })
                .collect();
            let mut short = Vec::new();
            let mut unparseable = Vec::new();
            for pvc in &data {
                match pvc.pointer("/status/capacity/storage").and_then(Value::as_str) {
                    None => short.push(format!("{}: no capacity", display_name(ctx, pvc))),
                    Some(raw) => match parse_quantity(raw) {
                        Ok(bytes) if bytes >= expected => {}
                        Ok(_) => short.push(format!("{}: {}", display_name(ctx, pvc), raw)),
                        Err(_) => unparseable.push(format!("{}: '{}'", display_name(ctx, pvc), raw)),
                    },
                }
            }

            let outcome = if data.is_empty() {
                ValidationOutcome::fail(
                    "resize_capacity",
                    format!("no PVCs named like '{}' match the selector", params.data_volume),
                )
            } else if !short.is_empty() {
                ValidationOutcome::fail(
                    "resize_capacity",
                    format!("{}/{} PVCs below expected capacity: {}", short.len(), data.len(), list_some(&short)),
                )
            } else if !unparseable.is_empty() {
                ValidationOutcome::skip(
                    "resize_capacity",
                    format!("cannot parse PVC capacity: {}", list_some(&unparseable)),
                )
            } else {
                ValidationOutcome::pass("resize_capacity", format!("all {} PVCs resized", data.len()))
            };
            outcome.with_extra("checked", data.len())
        }
    };
    if !log.record(outcome.with_duration(started.elapsed())) {
        return;
    }

    let sample = ctx.sample(&units_of(ctx, &vms));
    let command = format!("lsblk -b -dn -o SIZE {}", shell_quote(&params.disk_device));
    let outcome = guest_phase(ctx, "resize_guest", &sample, &command, block_size_judge(expected)).await;
    if outcome.status == Status::Skip {
        tracing::info!("guest resize not verified: {}", outcome.message);
    }
    log.record(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testing::*;
    use crate::checks::CheckKind;
    use crate::mock::{MockCluster, MockRemote};
    use serde_json::json;

    fn disk_vm(name: &str, size: &str) -> Value {
        json!({
            "metadata": {"name": name, "namespace": "scale"},
            "spec": {
                "dataVolumeTemplates": [
                    {"metadata": {"name": format!("{}-root", name)},
                     "spec": {"storage": {"resources": {"requests": {"storage": "30Gi"}}}}},
                    {"metadata": {"name": format!("{}-data", name)},
                     "spec": {"storage": {"resources": {"requests": {"storage": size}}}}}
                ]
            }
        })
    }

    fn pvc(name: &str, capacity: &str) -> Value {
        json!({
            "metadata": {"name": name, "namespace": "scale"},
            "status": {"capacity": {"storage": capacity}}
        })
    }

    fn disk_params(size: &str) -> CheckParams {
        CheckParams {
            expected_disk: Some(size.into()),
            ..CheckParams::default()
        }
    }

    #[test]
    fn data_volume_picked_by_name() {
        assert_eq!(data_volume_request(&disk_vm("a", "10Gi"), "data"), Some("10Gi"));
        assert_eq!(data_volume_request(&disk_vm("a", "10Gi"), "scratch"), None);
    }

    #[test]
    fn hotplug_counts_ready_volumes() {
        let v = json!({"status": {"volumeStatus": [
            {"name": "rootdisk"},
            {"name": "hp1", "hotplugVolume": {}, "phase": "Ready"},
            {"name": "hp2", "hotplugVolume": {}, "phase": "AttachedToNode"}
        ]}});
        assert_eq!(attached_hotplug_volumes(&v), 1);
    }

    #[tokio::test]
    async fn disk_spec_guest_and_mount() {
        let cluster = MockCluster::new();
        cluster.queue_list("vm", vec![disk_vm("a", "10Gi")]);
        let remote = MockRemote::answering("");
        remote.on_command("lsblk -b -dn -o SIZE '/dev/vdb'", "10737418240");
        remote.on_command("grep -c ' /data ' /proc/mounts || true", "1");
        let ctx = context(&cluster, Some(&remote), 100);
        let params = CheckParams {
            mount: Some("/data".into()),
            ..disk_params("10Gi")
        };

        let report = CheckKind::Disk.run(&ctx, &params).await;

        assert!(report.is_success(), "{:?}", report.validations);
        assert_eq!(report.phase("disk_guest").unwrap().status, Status::Pass);
        assert_eq!(report.phase("disk_mount").unwrap().status, Status::Pass);
    }

    #[tokio::test]
    async fn disk_spec_mismatch_fails() {
        let cluster = MockCluster::new();
        cluster.queue_list("vm", vec![disk_vm("a", "10Gi"), disk_vm("b", "5Gi")]);
        let ctx = context(&cluster, None, 100);

        let report = CheckKind::Disk.run(&ctx, &disk_params("10Gi")).await;
        let phase = report.phase("disk_spec").unwrap();
        assert_eq!(phase.status, Status::Fail);
        assert!(phase.message.contains("scale/b: 5Gi"));
    }

    #[tokio::test]
    async fn unparseable_data_volume_size_is_skip() {
        let cluster = MockCluster::new();
        cluster.queue_list("vm", vec![disk_vm("a", "ten gigs")]);
        let ctx = context(&cluster, None, 100);

        let report = CheckKind::Disk.run(&ctx, &disk_params("10Gi")).await;
        let phase = report.phase("disk_spec").unwrap();
        assert_eq!(phase.status, Status::Skip);
        assert!(phase.message.contains("scale/a: 'ten gigs'"));
        assert!(report.is_success(), "{:?}", report.validations);
    }

    #[tokio::test]
    async fn small_guest_device_fails() {
        let cluster = MockCluster::new();
        cluster.queue_list("vm", vec![disk_vm("a", "10Gi")]);
        let remote = MockRemote::answering("5368709120");
        let ctx = context(&cluster, Some(&remote), 100);

        let report = CheckKind::Disk.run(&ctx, &disk_params("10Gi")).await;
        assert_eq!(report.phase("disk_guest").unwrap().status, Status::Fail);
    }

    #[tokio::test]
    async fn hotplug_attached_and_visible() {
        let cluster = MockCluster::new();
        cluster.queue_list(
            "vmi",
            vec![json!({
                "metadata": {"name": "a", "namespace": "scale"},
                "status": {"phase": "Running", "volumeStatus": [
                    {"name": "rootdisk"},
                    {"name": "hp1", "hotplugVolume": {}, "phase": "Ready"},
                    {"name": "hp2", "hotplugVolume": {}, "phase": "Ready"}
                ]}
            })],
        );
        let remote = MockRemote::answering("3");
        let ctx = context(&cluster, Some(&remote), 100);
        let params = CheckParams {
            expected_hotplug: Some(2),
            ..CheckParams::default()
        };

        let report = CheckKind::Hotplug.run(&ctx, &params).await;
        assert!(report.is_success());
        assert_eq!(report.phase("hotplug_guest").unwrap().status, Status::Pass);
    }

    #[tokio::test]
    async fn resize_capacity_reached() {
        let cluster = MockCluster::new();
        cluster.queue_list("vm", vec![disk_vm("a", "10Gi")]);
        cluster.queue_list("pvc", vec![pvc("a-root", "30Gi"), pvc("a-data", "20Gi")]);
        let remote = MockRemote::answering("21474836480");
        let ctx = context(&cluster, Some(&remote), 100);

        let report = CheckKind::Resize.run(&ctx, &disk_params("20Gi")).await;
        assert!(report.is_success(), "{:?}", report.validations);
        assert_eq!(report.phase("resize_capacity").unwrap().extra["checked"], 1);
    }

    #[tokio::test]
    async fn unparseable_pvc_capacity_is_skip() {
        let cluster = MockCluster::new();
        cluster.queue_list("vm", vec![disk_vm("a", "10Gi")]);
        cluster.queue_list("pvc", vec![pvc("a-data", "20 GiB")]);
        let ctx = context(&cluster, None, 100);

        let report = CheckKind::Resize.run(&ctx, &disk_params("20Gi")).await;
        let phase = report.phase("resize_capacity").unwrap();
        assert_eq!(phase.status, Status::Skip);
        assert!(phase.message.contains("scale/a-data: '20 GiB'"));
        assert!(report.is_success(), "{:?}", report.validations);
    }

    #[tokio::test]
    async fn resize_not_yet_applied_fails() {
        let cluster = MockCluster::new();
        cluster.queue_list("vm", vec![disk_vm("a", "10Gi")]);
        cluster.queue_list("pvc", vec![pvc("a-data", "10Gi")]);
        let ctx = context(&cluster, None, 100);

        let report = CheckKind::Resize.run(&ctx, &disk_params("20Gi")).await;
        let phase = report.phase("resize_capacity").unwrap();
        assert_eq!(phase.status, Status::Fail);
        assert!(phase.message.contains("scale/a-data: 10Gi"));
    }
}
