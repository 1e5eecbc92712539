//! vCPU check: declared topology, guest `nproc`, optional workload process.

use scale_core::PhaseLog;
use scale_types::ValidationOutcome;
use serde_json::Value;

use super::{
    compare_phase, discover, guest_phase, parse_count, process_signature, record_guest, units_of,
    CheckContext, CheckParams,
};

/// vCPUs declared by a VM template (cores × sockets × threads, each defaulting to 1).
pub(super) fn declared_vcpus(vm: &Value) -> u64 {
    let cpu = vm.pointer("/spec/template/spec/domain/cpu");
    let field = |name: &str| {
        cpu.and_then(|c| c.get(name))
            .and_then(Value::as_u64)
            .unwrap_or(1)
    };
    field("cores") * field("sockets") * field("threads")
}

pub(super) async fn run(ctx: &CheckContext, params: &CheckParams, log: &mut PhaseLog) {
    let (outcome, vms) = discover(ctx, params, "vm").await;
    if !log.record(outcome) {
        return;
    }

    let Some(expected) = params.expected_cores else {
        log.record(ValidationOutcome::skip("cpu_spec", "no expected core count given"));
        return;
    };

    let outcome = compare_phase(ctx, "cpu_spec", &vms, &format!("{} vCPUs", expected), |vm| {
        match declared_vcpus(vm) {
            n if n == u64::from(expected) => Ok(()),
            n => Err(format!("{} vCPUs", n)),
        }
    });
    if !log.record(outcome) {
        return;
    }

    let sample = ctx.sample(&units_of(ctx, &vms));
    let outcome = guest_phase(ctx, "cpu_guest", &sample, "nproc", |out| {
        match parse_count(out)? {
            n if n == u64::from(expected) => Ok(()),
            n => Err(format!("guest reports {} CPUs", n).into()),
        }
    })
    .await;
    let (ok, status) = record_guest(log, outcome);
    if !ok {
        return;
    }

    process_signature(ctx, params, log, status, &sample).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testing::*;
    use crate::checks::CheckKind;
    use crate::mock::{MockCluster, MockRemote};
    use scale_types::{OverallStatus, Status};
    use serde_json::json;

    fn cpu_vm(name: &str, cores: u64) -> Value {
        vm(name, json!({"domain": {"cpu": {"cores": cores}}}))
    }

    fn params(expected: u32) -> CheckParams {
        CheckParams {
            expected_cores: Some(expected),
            ..CheckParams::default()
        }
    }

    #[test]
    fn topology_multiplies() {
        let v = vm("a", json!({"domain": {"cpu": {"cores": 2, "sockets": 2, "threads": 2}}}));
        assert_eq!(declared_vcpus(&v), 8);
        assert_eq!(declared_vcpus(&vm("b", json!({}))), 1);
    }

    #[tokio::test]
    async fn spec_mismatch_short_circuits_guest_phases() {
        let cluster = MockCluster::new();
        cluster.queue_list("vm", vec![cpu_vm("a", 8), cpu_vm("b", 4), cpu_vm("c", 8)]);
        let remote = MockRemote::answering("8");
        let ctx = context(&cluster, Some(&remote), 100);

        let report = CheckKind::Cpu.run(&ctx, &params(8)).await;

        assert_eq!(report.overall_status, OverallStatus::Failed);
        assert_eq!(report.exit_code, 1);
        let phases: Vec<&str> = report.validations.iter().map(|v| v.phase.as_str()).collect();
        assert_eq!(phases, vec!["discovery", "cpu_spec"]);
        assert!(report.validations[1].message.contains("scale/b: 4 vCPUs"));
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn guest_and_process_pass() {
        let cluster = MockCluster::new();
        cluster.queue_list("vm", vec![cpu_vm("a", 4), cpu_vm("b", 4)]);
        let remote = MockRemote::answering("4");
        remote.on_command("pgrep -fc 'stress-ng' || true", "2");
        let ctx = context(&cluster, Some(&remote), 100);
        let params = CheckParams {
            process: Some("stress-ng".into()),
            ..params(4)
        };

        let report = CheckKind::Cpu.run(&ctx, &params).await;

        assert!(report.is_success());
        assert_eq!(report.phase("cpu_guest").unwrap().status, Status::Pass);
        assert_eq!(report.phase("workload_process").unwrap().status, Status::Pass);
    }

    #[tokio::test]
    async fn guest_mismatch_fails() {
        let cluster = MockCluster::new();
        cluster.queue_list("vm", vec![cpu_vm("a", 4)]);
        let remote = MockRemote::answering("2");
        let ctx = context(&cluster, Some(&remote), 100);

        let report = CheckKind::Cpu.run(&ctx, &params(4)).await;

        assert_eq!(report.exit_code, 1);
        assert_eq!(report.phase("cpu_guest").unwrap().status, Status::Fail);
    }

    #[tokio::test]
    async fn no_credentials_skips_guest_and_process() {
        let cluster = MockCluster::new();
        cluster.queue_list("vm", vec![cpu_vm("a", 4)]);
        let ctx = context(&cluster, None, 100);
        let params = CheckParams {
            process: Some("stress-ng".into()),
            ..params(4)
        };

        let report = CheckKind::Cpu.run(&ctx, &params).await;

        assert!(report.is_success());
        assert_eq!(report.phase("cpu_guest").unwrap().status, Status::Skip);
        let process = report.phase("workload_process").unwrap();
        assert_eq!(process.status, Status::Skip);
        assert_eq!(process.message, "remote execution unavailable");
    }

    #[tokio::test]
    async fn missing_process_fails() {
        let cluster = MockCluster::new();
        cluster.queue_list("vm", vec![cpu_vm("a", 4)]);
        let remote = MockRemote::answering("4");
        remote.on_command("pgrep -fc 'stress-ng' || true", "0");
        let ctx = context(&cluster, Some(&remote), 100);
        let params = CheckParams {
            process: Some("stress-ng".into()),
            ..params(4)
        };

        let report = CheckKind::Cpu.run(&ctx, &params).await;
        assert_eq!(report.phase("workload_process").unwrap().status, Status::Fail);
    }
}
