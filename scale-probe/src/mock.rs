//! Mock collaborators for testing.
//!
//! Allows scripting cluster responses and per-unit remote behaviour, and
//! captures calls for verification.

use async_trait::async_trait;
use scale_types::UnitRef;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use crate::cluster::{ClusterClient, Scope};
use crate::error::{ProbeError, RemoteError};
use crate::remote::RemoteExec;

/// Mock cluster client.
///
/// Each kind has a queue of list responses. A list call pops the front
/// while more than one response is queued, then keeps returning the last,
/// which models state converging over successive polls.
#[derive(Debug, Default, Clone)]
pub struct MockCluster {
    inner: Arc<Mutex<MockClusterInner>>,
}

#[derive(Debug, Default)]
struct MockClusterInner {
    responses: HashMap<String, VecDeque<Vec<Value>>>,
    fail_next_list: Option<String>,
    list_calls: usize,
    deletes: Vec<(String, String)>,
}

impl MockCluster {
    /// Create an empty mock cluster (every kind lists as empty).
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a list response for `kind`.
    pub fn queue_list(&self, kind: &str, items: Vec<Value>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .responses
            .entry(kind.to_string())
            .or_default()
            .push_back(items);
    }

    /// Cause the next list() to fail.
    pub fn fail_next_list(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_list = Some(error.to_string());
    }

    /// Number of list() calls so far.
    pub fn list_calls(&self) -> usize {
        self.inner.lock().unwrap().list_calls
    }

    /// Captured deletes as `(kinds, selector)`.
    pub fn deletes(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().deletes.clone()
    }
}

#[async_trait]
impl ClusterClient for MockCluster {
    async fn list(
        &self,
        kind: &str,
        _scope: &Scope,
        _selector: &str,
    ) -> Result<Vec<Value>, ProbeError> {
        let mut inner = self.inner.lock().unwrap();
        inner.list_calls += 1;

        if let Some(error) = inner.fail_next_list.take() {
            return Err(ProbeError::CommandFailed {
                program: "mock".into(),
                exit_code: 1,
                stderr: error,
            });
        }

        let Some(queue) = inner.responses.get_mut(kind) else {
            return Ok(Vec::new());
        };
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap_or_default())
        } else {
            Ok(queue.front().cloned().unwrap_or_default())
        }
    }

    async fn delete_by_label(
        &self,
        kinds: &[&str],
        _scope: &Scope,
        selector: &str,
    ) -> Result<(), ProbeError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .deletes
            .push((kinds.join(","), selector.to_string()));
        Ok(())
    }
}

/// Mock remote executor.
///
/// By default every unit answers every command with `default_output`.
/// Units can be made permanently unreachable, unreachable for their first
/// N attempts, or answer specific commands with specific output.
#[derive(Debug, Default, Clone)]
pub struct MockRemote {
    inner: Arc<Mutex<MockRemoteInner>>,
}

#[derive(Debug, Default)]
struct MockRemoteInner {
    default_output: String,
    outputs: HashMap<(String, String), String>,
    command_outputs: HashMap<String, String>,
    unreachable: HashSet<String>,
    unreachable_first: usize,
    transient_failures: HashMap<String, u32>,
    calls: Vec<(String, String)>,
}

impl MockRemote {
    /// Mock where every command prints `output`.
    pub fn answering(output: &str) -> Self {
        let mock = Self::default();
        mock.inner.lock().unwrap().default_output = output.to_string();
        mock
    }

    /// Every unit answers `command` with `output`.
    pub fn on_command(&self, command: &str, output: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .command_outputs
            .insert(command.to_string(), output.to_string());
    }

    /// One unit answers `command` with `output`.
    pub fn on_unit_command(&self, unit: &UnitRef, command: &str, output: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .outputs
            .insert((unit.to_string(), command.to_string()), output.to_string());
    }

    /// `unit` never answers.
    pub fn set_unreachable(&self, unit: &UnitRef) {
        self.inner.lock().unwrap().unreachable.insert(unit.to_string());
    }

    /// The first `n` distinct units contacted never answer.
    pub fn unreachable_first(&self, n: usize) {
        self.inner.lock().unwrap().unreachable_first = n;
    }

    /// `unit` fails its first `n` calls, then answers.
    pub fn fail_first_calls(&self, unit: &UnitRef, n: u32) {
        self.inner
            .lock()
            .unwrap()
            .transient_failures
            .insert(unit.to_string(), n);
    }

    /// Captured calls as `(unit, command)`.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Distinct units contacted.
    pub fn contacted_units(&self) -> HashSet<String> {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .map(|(u, _)| u.clone())
            .collect()
    }
}

#[async_trait]
impl RemoteExec for MockRemote {
    async fn run(&self, unit: &UnitRef, command: &str) -> Result<String, RemoteError> {
        let mut inner = self.inner.lock().unwrap();
        let key = unit.to_string();

        let first_contact = !inner.calls.iter().any(|(u, _)| u == &key);
        inner.calls.push((key.clone(), command.to_string()));

        if first_contact && inner.unreachable_first > 0 {
            inner.unreachable_first -= 1;
            inner.unreachable.insert(key.clone());
        }

        let unreachable = RemoteError::CommandFailed {
            unit: key.clone(),
            exit_code: 255,
            stderr: "connection refused".into(),
        };

        if inner.unreachable.contains(&key) {
            return Err(unreachable);
        }
        if let Some(remaining) = inner.transient_failures.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(unreachable);
            }
        }

        let output = inner
            .outputs
            .get(&(key, command.to_string()))
            .or_else(|| inner.command_outputs.get(command))
            .cloned()
            .unwrap_or_else(|| inner.default_output.clone());
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn cluster_queue_converges_on_last_response() {
        let cluster = MockCluster::new();
        cluster.queue_list("vmi", vec![json!({"n": 1})]);
        cluster.queue_list("vmi", vec![json!({"n": 1}), json!({"n": 2})]);

        let scope = Scope::AllNamespaces;
        assert_eq!(cluster.list("vmi", &scope, "").await.unwrap().len(), 1);
        assert_eq!(cluster.list("vmi", &scope, "").await.unwrap().len(), 2);
        assert_eq!(cluster.list("vmi", &scope, "").await.unwrap().len(), 2);
        assert!(cluster.list("vm", &scope, "").await.unwrap().is_empty());
        assert_eq!(cluster.list_calls(), 4);
    }

    #[tokio::test]
    async fn cluster_fail_next_list_once() {
        let cluster = MockCluster::new();
        cluster.fail_next_list("apiserver unavailable");
        let scope = Scope::AllNamespaces;
        assert!(cluster.list("vmi", &scope, "").await.is_err());
        assert!(cluster.list("vmi", &scope, "").await.is_ok());
    }

    #[tokio::test]
    async fn remote_transient_then_ok() {
        let remote = MockRemote::answering("ok");
        let unit = UnitRef::new("ns", "vm-1");
        remote.fail_first_calls(&unit, 2);
        assert!(remote.run(&unit, "echo ok").await.is_err());
        assert!(remote.run(&unit, "echo ok").await.is_err());
        assert_eq!(remote.run(&unit, "echo ok").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn remote_unreachable_first_n_units() {
        let remote = MockRemote::answering("ok");
        let a = UnitRef::new("ns", "a");
        let b = UnitRef::new("ns", "b");
        remote.unreachable_first(1);
        assert!(remote.run(&a, "x").await.is_err());
        assert!(remote.run(&a, "x").await.is_err());
        assert!(remote.run(&b, "x").await.is_ok());
        assert_eq!(remote.contacted_units().len(), 2);
    }

    #[tokio::test]
    async fn remote_output_precedence() {
        let remote = MockRemote::answering("default");
        let a = UnitRef::new("ns", "a");
        remote.on_command("nproc", "8");
        remote.on_unit_command(&a, "nproc", "4");
        assert_eq!(remote.run(&a, "nproc").await.unwrap(), "4");
        assert_eq!(remote.run(&UnitRef::new("ns", "b"), "nproc").await.unwrap(), "8");
        assert_eq!(remote.run(&a, "uptime").await.unwrap(), "default");
    }
}
