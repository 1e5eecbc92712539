//! NIC check: declared interfaces, then non-loopback links in the guest.

use scale_core::PhaseLog;
use scale_types::ValidationOutcome;
use serde_json::Value;

use super::{compare_phase, discover, guest_phase, parse_count, units_of, CheckContext, CheckParams};

const GUEST_LINKS: &str = "ip -o link show | grep -cv ': lo:' || true";

fn declared_interfaces(vm: &Value) -> usize {
    vm.pointer("/spec/template/spec/domain/devices/interfaces")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0)
}

pub(super) async fn run(ctx: &CheckContext, params: &CheckParams, log: &mut PhaseLog) {
    let (outcome, vms) = discover(ctx, params, "vm").await;
    if !log.record(outcome) {
        return;
    }

    let Some(expected) = params.expected_nics else {
        log.record(ValidationOutcome::skip("nic_spec", "no expected interface count given"));
        return;
    };

    let outcome = compare_phase(ctx, "nic_spec", &vms, &format!("{} interfaces", expected), |vm| {
        match declared_interfaces(vm) {
            n if n == expected => Ok(()),
            n => Err(format!("{} interfaces", n)),
        }
    });
    if !log.record(outcome) {
        return;
    }

    let sample = ctx.sample(&units_of(ctx, &vms));
    let outcome = guest_phase(ctx, "nic_guest", &sample, GUEST_LINKS, |out| {
        match parse_count(out)? {
            n if n == expected as u64 => Ok(()),
            n => Err(format!("guest has {} links", n).into()),
        }
    })
    .await;
    log.record(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testing::*;
    use crate::checks::CheckKind;
    use crate::mock::{MockCluster, MockRemote};
    use scale_types::Status;
    use serde_json::json;

    fn nic_vm(name: &str, n: usize) -> Value {
        let interfaces: Vec<Value> = (0..n).map(|i| json!({"name": format!("nic{}", i)})).collect();
        vm(name, json!({"domain": {"devices": {"interfaces": interfaces}}}))
    }

    fn params(expected: usize) -> CheckParams {
        CheckParams {
            expected_nics: Some(expected),
            ..CheckParams::default()
        }
    }

    #[tokio::test]
    async fn declared_and_guest_match() {
        let cluster = MockCluster::new();
        cluster.queue_list("vm", vec![nic_vm("a", 3), nic_vm("b", 3)]);
        let remote = MockRemote::answering("3");
        let ctx = context(&cluster, Some(&remote), 50);

        let report = CheckKind::Nic.run(&ctx, &params(3)).await;
        assert!(report.is_success());
        assert_eq!(report.phase("nic_guest").unwrap().extra["sample_size"], 1);
    }

    #[tokio::test]
    async fn declared_mismatch_fails() {
        let cluster = MockCluster::new();
        cluster.queue_list("vm", vec![nic_vm("a", 1)]);
        let ctx = context(&cluster, None, 50);

        let report = CheckKind::Nic.run(&ctx, &params(3)).await;
        assert_eq!(report.phase("nic_spec").unwrap().status, Status::Fail);
    }

    #[tokio::test]
    async fn guest_missing_link_fails() {
        let cluster = MockCluster::new();
        cluster.queue_list("vm", vec![nic_vm("a", 2)]);
        let remote = MockRemote::answering("1");
        let ctx = context(&cluster, Some(&remote), 100);

        let report = CheckKind::Nic.run(&ctx, &params(2)).await;
        assert_eq!(report.phase("nic_guest").unwrap().status, Status::Fail);
        assert_eq!(remote.calls()[0].1, GUEST_LINKS);
    }
}
