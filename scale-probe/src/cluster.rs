//! Cluster query/mutate client.
//!
//! Objects are addressed by kind, scope and label selector, never by name
//! enumeration. Reads return raw JSON objects; checks extract fields with
//! JSON pointers.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ProbeError;

/// Namespace scope of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// One namespace.
    Namespace(String),
    /// Cluster-wide (`-A`).
    AllNamespaces,
}

impl Scope {
    /// Label used in reports (`all` for cluster-wide).
    pub fn label(&self) -> &str {
        match self {
            Scope::Namespace(ns) => ns,
            Scope::AllNamespaces => "all",
        }
    }

    fn args(&self) -> Vec<String> {
        match self {
            Scope::Namespace(ns) => vec!["-n".into(), ns.clone()],
            Scope::AllNamespaces => vec!["-A".into()],
        }
    }
}

/// Read/delete access to cluster objects.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// List objects of `kind` matching `selector` in `scope`.
    async fn list(&self, kind: &str, scope: &Scope, selector: &str)
        -> Result<Vec<Value>, ProbeError>;

    /// Delete every object of the given kinds matching `selector`.
    async fn delete_by_label(
        &self,
        kinds: &[&str],
        scope: &Scope,
        selector: &str,
    ) -> Result<(), ProbeError>;
}

/// `kubectl`-backed client.
#[derive(Debug, Clone)]
pub struct KubectlClient {
    binary: String,
    kubeconfig: Option<PathBuf>,
    timeout: Duration,
}

impl Default for KubectlClient {
    fn default() -> Self {
        Self {
            binary: "kubectl".to_string(),
            kubeconfig: None,
            timeout: Duration::from_secs(120),
        }
    }
}

impl KubectlClient {
    /// Client using `kubectl` from `PATH` and the ambient kubeconfig.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different binary (e.g. `oc`).
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Use an explicit kubeconfig.
    pub fn with_kubeconfig(mut self, path: PathBuf) -> Self {
        self.kubeconfig = Some(path);
        self
    }

    /// Bound on a single invocation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, args: Vec<String>) -> Result<String, ProbeError> {
        let mut cmd = tokio::process::Command::new(&self.binary);
        if let Some(kubeconfig) = &self.kubeconfig {
            cmd.arg("--kubeconfig").arg(kubeconfig);
        }
        cmd.args(&args).kill_on_drop(true);

        tracing::debug!(binary = %self.binary, ?args, "cluster call");

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|source| ProbeError::Spawn {
                program: self.binary.clone(),
                source,
            })?,
            Err(_) => {
                return Err(ProbeError::Timeout {
                    program: self.binary.clone(),
                    seconds: self.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            return Err(ProbeError::CommandFailed {
                program: self.binary.clone(),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

fn selector_args(selector: &str) -> Vec<String> {
    if selector.is_empty() {
        vec![]
    } else {
        vec!["-l".into(), selector.to_string()]
    }
}

/// Extract `items` from a `kubectl get -o json` list.
pub fn parse_list(stdout: &str) -> Result<Vec<Value>, ProbeError> {
    let value: Value = serde_json::from_str(stdout)?;
    match value.get("items") {
        Some(Value::Array(items)) => Ok(items.clone()),
        _ => Err(ProbeError::UnexpectedResponse(
            "list response has no items array".to_string(),
        )),
    }
}

#[async_trait]
impl ClusterClient for KubectlClient {
    async fn list(
        &self,
        kind: &str,
        scope: &Scope,
        selector: &str,
    ) -> Result<Vec<Value>, ProbeError> {
        let mut args = vec!["get".to_string(), kind.to_string()];
        args.extend(scope.args());
        args.extend(selector_args(selector));
        args.extend(["-o".to_string(), "json".to_string()]);

        let stdout = self.run(args).await?;
        parse_list(&stdout)
    }

    async fn delete_by_label(
        &self,
        kinds: &[&str],
        scope: &Scope,
        selector: &str,
    ) -> Result<(), ProbeError> {
        let mut args = vec!["delete".to_string(), kinds.join(",")];
        args.extend(scope.args());
        args.extend(selector_args(selector));
        args.extend(["--ignore-not-found".to_string(), "--wait=false".to_string()]);

        self.run(args).await?;
        Ok(())
    }
}
