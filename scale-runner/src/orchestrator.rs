//! Suite orchestration.
//!
//! Every test runs as a separate execution unit (a child process). The
//! orchestrator never sees a unit's memory; it pre-computes each unit's
//! results directory and, once units have terminated, reads back the
//! `summary.json` each one left there.
//!
//! # Failure handling
//!
//! - A failing test never stops its siblings.
//! - A unit that cannot be launched, crashes, or is killed before writing
//!   its record is reconciled as the missing-record sentinel (exit code 999,
//!   `NO_SUMMARY`), never as a pass.
//! - Cleanup errors are logged and do not change a test's result.

use async_trait::async_trait;
use futures_util::future::join_all;
use scale_probe::{store, ClusterClient, ProbeError, Scope};
use scale_types::{Mode, TestExecutionRecord};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::registry::TestDefinition;

/// Objects removed by the default teardown.
pub const TEARDOWN_KINDS: [&str; 4] = ["vm", "vmi", "dv", "pvc"];

/// How units are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strategy {
    /// One at a time, in order; unit N+1 starts after unit N has exited.
    #[default]
    Sequential,
    /// All at once, then wait for every unit.
    Concurrent,
}

/// Starts one execution unit and waits for it to exit.
#[async_trait]
pub trait UnitLauncher: Send + Sync {
    /// Run `test` with its results under `results_dir`. Returns the unit's
    /// process exit code; the authoritative outcome is the record on disk.
    async fn launch(&self, test: &TestDefinition, mode: Mode, results_dir: &Path) -> std::io::Result<i32>;
}

/// Launches units by re-invoking this binary with `exec-unit`.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    exe: PathBuf,
    suite_dir: PathBuf,
    config: Option<PathBuf>,
    verbose: bool,
}

impl ProcessLauncher {
    /// Launcher for `exe` (normally `std::env::current_exe()`).
    pub fn new(exe: PathBuf, suite_dir: PathBuf) -> Self {
        Self {
            exe,
            suite_dir,
            config: None,
            verbose: false,
        }
    }

    /// Forward an explicit config file to every unit.
    pub fn with_config(mut self, config: Option<PathBuf>) -> Self {
        self.config = config;
        self
    }

    /// Forward `--verbose`.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn args(&self, test: &TestDefinition, mode: Mode, results_dir: &Path) -> Vec<String> {
        let mut args = vec![
            "exec-unit".to_string(),
            test.name.clone(),
            "--mode".to_string(),
            mode.to_string(),
            "--results-dir".to_string(),
            results_dir.display().to_string(),
            "--suite-dir".to_string(),
            self.suite_dir.display().to_string(),
        ];
        if let Some(config) = &self.config {
            args.push("--config".to_string());
            args.push(config.display().to_string());
        }
        if self.verbose {
            args.push("--verbose".to_string());
        }
        args
    }
}

#[async_trait]
impl UnitLauncher for ProcessLauncher {
    async fn launch(&self, test: &TestDefinition, mode: Mode, results_dir: &Path) -> std::io::Result<i32> {
        let status = tokio::process::Command::new(&self.exe)
            .args(self.args(test, mode, results_dir))
            .stdin(std::process::Stdio::null())
            .status()
            .await?;
        Ok(status.code().unwrap_or(-1))
    }
}

/// Runs once per test after its unit has terminated.
#[async_trait]
pub trait CleanupHook: Send + Sync {
    /// Tear down whatever `test` left in the cluster.
    async fn after_test(&self, test: &TestDefinition) -> Result<(), ProbeError>;
}

/// Deletes the test's objects by its `cleanup_selector`, cluster-wide.
pub struct LabelTeardown {
    cluster: Arc<dyn ClusterClient>,
    enabled: bool,
}

impl LabelTeardown {
    /// Teardown through `cluster`; a no-op when `enabled` is false.
    pub fn new(cluster: Arc<dyn ClusterClient>, enabled: bool) -> Self {
        Self { cluster, enabled }
    }
}

#[async_trait]
impl CleanupHook for LabelTeardown {
    async fn after_test(&self, test: &TestDefinition) -> Result<(), ProbeError> {
        if !self.enabled {
            tracing::debug!(test = %test.name, "cleanup disabled");
            return Ok(());
        }
        let Some(selector) = &test.cleanup_selector else {
            tracing::debug!(test = %test.name, "no cleanup selector");
            return Ok(());
        };
        tracing::info!(test = %test.name, %selector, "deleting test objects");
        self.cluster
            .delete_by_label(&TEARDOWN_KINDS, &Scope::AllNamespaces, selector)
            .await
    }
}

/// Unique run directory: `<root>/<test>/<YYYYmmdd-HHMMSS.ffffff>-<6 hex>`.
pub fn new_run_dir(results_root: &Path, test: &str) -> PathBuf {
    let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S%.6f");
    let suffix = hex::encode(rand::random::<[u8; 3]>());
    results_root.join(test).join(format!("{}-{}", stamp, suffix))
}

/// Read back one unit's record, substituting the sentinel when it is absent.
pub async fn reconcile(test: &str, mode: Mode, results_dir: &Path) -> TestExecutionRecord {
    match store::read_record(results_dir).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            tracing::error!(
                test,
                results = %results_dir.display(),
                "execution unit left no summary; recording NO_SUMMARY"
            );
            TestExecutionRecord::missing(test, mode, results_dir.to_path_buf())
        }
        Err(e) => {
            tracing::error!(test, "unreadable execution summary ({}); recording NO_SUMMARY", e);
            TestExecutionRecord::missing(test, mode, results_dir.to_path_buf())
        }
    }
}

/// Runs a selection of tests and reconciles their records.
pub struct Orchestrator {
    launcher: Arc<dyn UnitLauncher>,
    cleanup: Arc<dyn CleanupHook>,
    results_root: PathBuf,
    mode: Mode,
}

impl Orchestrator {
    /// Create an orchestrator.
    pub fn new(
        launcher: Arc<dyn UnitLauncher>,
        cleanup: Arc<dyn CleanupHook>,
        results_root: PathBuf,
        mode: Mode,
    ) -> Self {
        Self {
            launcher,
            cleanup,
            results_root,
            mode,
        }
    }

    /// Run `tests` and return one record per test, in the given order.
    pub async fn run(&self, tests: &[TestDefinition], strategy: Strategy) -> Vec<TestExecutionRecord> {
        let dirs: Vec<PathBuf> = tests
            .iter()
            .map(|t| new_run_dir(&self.results_root, &t.name))
            .collect();

        tracing::info!(tests = tests.len(), ?strategy, mode = %self.mode, "starting suite");

        match strategy {
            Strategy::Sequential => {
                for (test, dir) in tests.iter().zip(&dirs) {
                    self.launch(test, dir).await;
                    self.cleanup(test).await;
                }
            }
            Strategy::Concurrent => {
                join_all(tests.iter().zip(&dirs).map(|(test, dir)| self.launch(test, dir))).await;
                for test in tests {
                    self.cleanup(test).await;
                }
            }
        }

        let mut records = Vec::with_capacity(tests.len());
        for (test, dir) in tests.iter().zip(&dirs) {
            records.push(reconcile(&test.name, self.mode, dir).await);
        }
        records
    }

    async fn launch(&self, test: &TestDefinition, dir: &Path) {
        tracing::info!(test = %test.name, results = %dir.display(), "launching execution unit");
        // Exists even if the unit never starts.
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            tracing::error!(test = %test.name, results = %dir.display(), "cannot create results directory: {}", e);
        }
        match self.launcher.launch(test, self.mode, dir).await {
            Ok(0) => tracing::info!(test = %test.name, "execution unit finished"),
            Ok(code) => tracing::warn!(test = %test.name, exit_code = code, "execution unit finished with failure"),
            Err(e) => tracing::error!(test = %test.name, "failed to launch execution unit: {}", e),
        }
    }

    async fn cleanup(&self, test: &TestDefinition) {
        if let Err(e) = self.cleanup.after_test(test).await {
            tracing::warn!(test = %test.name, "cleanup failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Overrides;
    use scale_probe::MockCluster;
    use scale_types::{ValidationStatus, NO_SUMMARY_EXIT_CODE};
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::tempdir;

    fn definition(name: &str) -> TestDefinition {
        TestDefinition {
            name: name.into(),
            description: None,
            directory: PathBuf::from("/suite").join(name),
            config: "kube-burner.yml".into(),
            overrides: Overrides {
                sanity: "sanity.yml".into(),
                full: "full.yml".into(),
            },
            cleanup_selector: Some(format!("scale-test={}", name)),
        }
    }

    #[derive(Clone, Copy)]
    enum Script {
        /// Write a record with this engine exit code.
        Record(i32),
        /// Exit without writing anything (killed unit).
        Vanish,
        /// Fail to start.
        SpawnError,
    }

    /// Launcher that plays a scripted unit per test.
    #[derive(Default)]
    struct ScriptedLauncher {
        scripts: HashMap<String, Script>,
        delay: Duration,
        running: Mutex<HashSet<String>>,
        max_running: Mutex<usize>,
        order: Mutex<Vec<String>>,
    }

    impl ScriptedLauncher {
        fn new(scripts: &[(&str, Script)]) -> Self {
            Self {
                scripts: scripts.iter().map(|(n, s)| (n.to_string(), *s)).collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl UnitLauncher for ScriptedLauncher {
        async fn launch(&self, test: &TestDefinition, mode: Mode, results_dir: &Path) -> std::io::Result<i32> {
            {
                let mut running = self.running.lock().unwrap();
                running.insert(test.name.clone());
                let mut max = self.max_running.lock().unwrap();
                *max = (*max).max(running.len());
            }
            self.order.lock().unwrap().push(test.name.clone());
            tokio::time::sleep(self.delay).await;
            self.running.lock().unwrap().remove(&test.name);

            match self.scripts[&test.name] {
                Script::Record(code) => {
                    let mut record = TestExecutionRecord::missing(&test.name, mode, results_dir.to_path_buf());
                    record.exit_code = code;
                    record.validation_status = ValidationStatus::NoReports;
                    store::write_record(results_dir, &record).await.unwrap();
                    Ok(code)
                }
                Script::Vanish => Ok(-1),
                Script::SpawnError => Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no binary")),
            }
        }
    }

    #[derive(Default)]
    struct RecordingCleanup {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CleanupHook for RecordingCleanup {
        async fn after_test(&self, test: &TestDefinition) -> Result<(), ProbeError> {
            self.calls.lock().unwrap().push(test.name.clone());
            Ok(())
        }
    }

    fn orchestrator(
        launcher: Arc<ScriptedLauncher>,
        cleanup: Arc<RecordingCleanup>,
        root: &Path,
    ) -> Orchestrator {
        Orchestrator::new(launcher, cleanup, root.to_path_buf(), Mode::Sanity)
    }

    #[tokio::test]
    async fn concurrent_killed_unit_is_no_summary() {
        let root = tempdir().unwrap();
        let mut launcher = ScriptedLauncher::new(&[
            ("a", Script::Record(0)),
            ("b", Script::Vanish),
            ("c", Script::Record(0)),
        ]);
        launcher.delay = Duration::from_millis(50);
        let launcher = Arc::new(launcher);
        let cleanup = Arc::new(RecordingCleanup::default());
        let tests = vec![definition("a"), definition("b"), definition("c")];

        let records = orchestrator(launcher.clone(), cleanup.clone(), root.path())
            .run(&tests, Strategy::Concurrent)
            .await;

        let names: Vec<&str> = records.iter().map(|r| r.test.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(records[0].passed());
        assert_eq!(records[1].exit_code, NO_SUMMARY_EXIT_CODE);
        assert_eq!(records[1].validation_status, ValidationStatus::NoSummary);
        assert!(!records[1].passed());
        assert!(records[2].passed());

        assert_eq!(*launcher.max_running.lock().unwrap(), 3);
        assert_eq!(*cleanup.calls.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn sequential_runs_one_at_a_time_and_continues_after_failure() {
        let root = tempdir().unwrap();
        let launcher = Arc::new(ScriptedLauncher::new(&[
            ("a", Script::Record(1)),
            ("b", Script::SpawnError),
            ("c", Script::Record(0)),
        ]));
        let cleanup = Arc::new(RecordingCleanup::default());
        let tests = vec![definition("a"), definition("b"), definition("c")];

        let records = orchestrator(launcher.clone(), cleanup.clone(), root.path())
            .run(&tests, Strategy::Sequential)
            .await;

        assert_eq!(*launcher.max_running.lock().unwrap(), 1);
        assert_eq!(*launcher.order.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(records[0].exit_code, 1);
        assert!(records[1].is_missing());
        assert!(records[2].passed());
        assert_eq!(cleanup.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn reconcile_is_repeatable() {
        let root = tempdir().unwrap();
        let dir = root.path().join("run");
        let mut record = TestExecutionRecord::missing("a", Mode::Full, dir.clone());
        record.exit_code = 0;
        record.validation_status = ValidationStatus::Success;
        store::write_record(&dir, &record).await.unwrap();

        let first = reconcile("a", Mode::Full, &dir).await;
        let second = reconcile("a", Mode::Full, &dir).await;
        assert_eq!(first, second);
        assert_eq!(first, record);
    }

    #[tokio::test]
    async fn corrupt_record_is_no_summary() {
        let root = tempdir().unwrap();
        std::fs::write(root.path().join("summary.json"), "{").unwrap();
        let record = reconcile("a", Mode::Sanity, root.path()).await;
        assert!(record.is_missing());
    }

    #[test]
    fn run_dirs_are_unique_and_shaped() {
        let root = Path::new("/results");
        let a = new_run_dir(root, "cpu");
        let b = new_run_dir(root, "cpu");
        assert_ne!(a, b);
        assert!(a.starts_with("/results/cpu"));

        let leaf = a.file_name().unwrap().to_str().unwrap();
        // 20261018-101500.123456-a1b2c3
        assert_eq!(leaf.len(), 29);
        assert_eq!(&leaf[8..9], "-");
        assert_eq!(&leaf[15..16], ".");
        assert_eq!(&leaf[22..23], "-");
    }

    #[tokio::test]
    async fn label_teardown_deletes_by_selector() {
        let cluster = MockCluster::new();
        let teardown = LabelTeardown::new(Arc::new(cluster.clone()), true);
        teardown.after_test(&definition("cpu")).await.unwrap();

        let mut no_selector = definition("boot");
        no_selector.cleanup_selector = None;
        teardown.after_test(&no_selector).await.unwrap();

        assert_eq!(
            cluster.deletes(),
            vec![("vm,vmi,dv,pvc".to_string(), "scale-test=cpu".to_string())]
        );

        let disabled = LabelTeardown::new(Arc::new(cluster.clone()), false);
        disabled.after_test(&definition("mem")).await.unwrap();
        assert_eq!(cluster.deletes().len(), 1);
    }

    #[test]
    fn process_launcher_args() {
        let launcher = ProcessLauncher::new("/bin/scale-runner".into(), "/suite".into())
            .with_config(Some("/etc/scale.toml".into()))
            .with_verbose(true);
        let args = launcher.args(&definition("cpu"), Mode::Full, Path::new("/results/cpu/x"));
        assert_eq!(
            args,
            vec![
                "exec-unit", "cpu", "--mode", "full", "--results-dir", "/results/cpu/x",
                "--suite-dir", "/suite", "--config", "/etc/scale.toml", "--verbose",
            ]
        );
    }
}
