//! Execution unit: one test, end to end, in its own process.
//!
//! The unit owns its results directory exclusively. It renders the mode's
//! override file, runs the provisioning engine, classifies whatever
//! validation reports the engine's hooks left behind, and finally writes
//! `summary.json`, which is the only thing the orchestrator reads back.

use scale_core::classify_reports;
use scale_probe::{store, StoreError};
use scale_types::{Mode, TestExecutionRecord};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use crate::config::SuiteConfig;
use crate::registry::TestDefinition;

/// Engine log file inside the results directory.
pub const ENGINE_LOG: &str = "kube-burner.log";

/// Exit code recorded when the config or override file is missing.
pub const MISSING_INPUT_EXIT_CODE: i32 = 2;

/// Exit code recorded when the engine cannot be started.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// Replace `{{KEY}}` placeholders. Unknown placeholders are left alone.
pub fn render_template(template: &str, vars: &[(&str, String)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{{{}}}}}", key), value)
    })
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Placeholder values for one run.
fn template_vars(test: &TestDefinition, run_id: &str, results_dir: &Path, config: &SuiteConfig) -> Vec<(&'static str, String)> {
    let mut vars = vec![
        ("RUN_ID", run_id.to_string()),
        ("RESULTS_DIR", results_dir.display().to_string()),
        ("TEST_NAME", test.name.clone()),
    ];
    vars.extend(config.to_env().into_iter().filter(|(k, _)| k.starts_with("VM_")));
    vars
}

/// Run `test` in `mode`, writing everything under `results_dir`.
///
/// Always returns a record, and has always written it, unless the results
/// directory itself cannot be written.
pub async fn run(
    test: &TestDefinition,
    mode: Mode,
    results_dir: &Path,
    config: &SuiteConfig,
) -> Result<TestExecutionRecord, StoreError> {
    let started = Instant::now();
    // The engine runs inside the test directory; every path handed to it
    // must survive the cwd change.
    let results_dir = &absolute(results_dir);
    tokio::fs::create_dir_all(results_dir)
        .await
        .map_err(|source| StoreError::Io {
            path: results_dir.to_path_buf(),
            source,
        })?;

    let run_id = uuid::Uuid::new_v4().to_string();
    let log_path = results_dir.join(ENGINE_LOG);
    tracing::info!(test = %test.name, %mode, %run_id, results = %results_dir.display(), "execution unit started");

    let exit_code = match prepare_inputs(test, mode, results_dir, &run_id, config).await {
        Ok((config_path, rendered)) => {
            run_engine(test, &config_path, &rendered, &run_id, results_dir, &log_path, config).await
        }
        Err(message) => {
            tracing::error!(test = %test.name, "{}", message);
            MISSING_INPUT_EXIT_CODE
        }
    };

    let reports = store::discover_reports(results_dir).await?;
    let validation_status = classify_reports(reports.iter().map(|(_, r)| r));
    let record = TestExecutionRecord {
        test: test.name.clone(),
        mode,
        exit_code,
        results_path: results_dir.to_path_buf(),
        kube_burner_log: log_path,
        validation_status,
        validation_files: reports.into_iter().map(|(path, _)| path).collect(),
        duration_seconds: started.elapsed().as_secs_f64(),
        timestamp: scale_types::now_rfc3339(),
    };
    store::write_record(results_dir, &record).await?;

    tracing::info!(
        test = %test.name,
        exit_code,
        validation = %record.validation_status,
        "execution unit finished"
    );
    Ok(record)
}

/// Locate the engine config and render the override file into `results_dir`.
async fn prepare_inputs(
    test: &TestDefinition,
    mode: Mode,
    results_dir: &Path,
    run_id: &str,
    config: &SuiteConfig,
) -> Result<(PathBuf, PathBuf), String> {
    let config_path = absolute(&test.config_path());
    if !config_path.is_file() {
        return Err(format!("engine config not found: {}", config_path.display()));
    }

    let override_path = test.override_path(mode);
    let template = tokio::fs::read_to_string(&override_path)
        .await
        .map_err(|e| format!("override file {} unreadable: {}", override_path.display(), e))?;

    let rendered = render_template(&template, &template_vars(test, run_id, results_dir, config));
    let file_name = override_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "overrides.yml".into());
    let rendered_path = results_dir.join(file_name);
    tokio::fs::write(&rendered_path, rendered)
        .await
        .map_err(|e| format!("cannot write {}: {}", rendered_path.display(), e))?;

    Ok((config_path, rendered_path))
}

/// Run the engine to completion and return its exit code.
/// Engine log opened once, handed out as separate stdout and stderr handles.
async fn engine_log(path: &Path) -> std::io::Result<(std::fs::File, std::fs::File)> {
    let file = tokio::fs::File::create(path).await?.into_std().await;
    Ok((file.try_clone()?, file))
}

async fn run_engine(
    test: &TestDefinition,
    config_path: &Path,
    rendered: &Path,
    run_id: &str,
    results_dir: &Path,
    log_path: &Path,
    config: &SuiteConfig,
) -> i32 {
    let log = match engine_log(log_path).await {
        Ok(pair) => pair,
        Err(e) => {
            tracing::error!(log = %log_path.display(), "cannot create engine log: {}", e);
            return SPAWN_FAILURE_EXIT_CODE;
        }
    };

    let mut cmd = tokio::process::Command::new(&config.engine.binary);
    cmd.arg("init")
        .arg("-c")
        .arg(config_path)
        .arg("--user-data")
        .arg(rendered)
        .arg("--uuid")
        .arg(run_id)
        .args(&config.engine.extra_args)
        .current_dir(&test.directory)
        .envs(config.to_env())
        .env("RUN_ID", run_id)
        .env("RESULTS_DIR", results_dir)
        .env("TEST_NAME", &test.name)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log.0))
        .stderr(Stdio::from(log.1));

    tracing::debug!(engine = %config.engine.binary, config = %config_path.display(), "starting engine");

    match cmd.status().await {
        Ok(status) => {
            let code = status.code().unwrap_or(-1);
            if code != 0 {
                tracing::warn!(test = %test.name, exit_code = code, log = %log_path.display(), "engine failed");
            }
            code
        }
        Err(e) => {
            tracing::error!(engine = %config.engine.binary, "failed to start engine: {}", e);
            SPAWN_FAILURE_EXIT_CODE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Overrides;
    use scale_types::{ValidationOutcome, ValidationReport, ValidationStatus};
    use serde_json::Map;
    use tempfile::tempdir;

    fn definition(dir: &Path) -> TestDefinition {
        TestDefinition {
            name: "cpu-limits".into(),
            description: None,
            directory: dir.to_path_buf(),
            config: "kube-burner.yml".into(),
            overrides: Overrides {
                sanity: "sanity.yml".into(),
                full: "full.yml".into(),
            },
            cleanup_selector: None,
        }
    }

    /// Engine stand-in: a shell script running `body`.
    fn fake_engine(dir: &Path, body: &str) -> String {
        let path = dir.join("fake-engine.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        path.display().to_string()
    }

    #[test]
    fn renders_known_placeholders_only() {
        let out = render_template(
            "uuid: {{RUN_ID}}\nout: {{RESULTS_DIR}}\nname: {{ .JobName }}\nx: {{OTHER}}",
            &[("RUN_ID", "abc".into()), ("RESULTS_DIR", "/r".into())],
        );
        assert_eq!(out, "uuid: abc\nout: /r\nname: {{ .JobName }}\nx: {{OTHER}}");
    }

    #[test]
    fn workload_sizing_is_templated() {
        let dir = tempdir().unwrap();
        let mut config = SuiteConfig::default();
        config.workload.vm_count = Some(400);
        let vars = template_vars(&definition(dir.path()), "id", dir.path(), &config);
        assert!(vars.contains(&("VM_COUNT", "400".to_string())));
        assert!(!vars.iter().any(|(k, _)| *k == "SSH_USER"));
    }

    #[tokio::test]
    async fn missing_override_records_exit_code_2() {
        let suite = tempdir().unwrap();
        let results = tempdir().unwrap();
        std::fs::write(suite.path().join("kube-burner.yml"), "jobs: []").unwrap();

        let record = run(&definition(suite.path()), Mode::Full, results.path(), &SuiteConfig::default())
            .await
            .unwrap();

        assert_eq!(record.exit_code, MISSING_INPUT_EXIT_CODE);
        assert_eq!(record.validation_status, ValidationStatus::NoReports);
        let back = store::read_record(results.path()).await.unwrap().unwrap();
        assert_eq!(back, record);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn engine_runs_with_rendered_overrides() {
        let suite = tempdir().unwrap();
        let results = tempdir().unwrap();
        std::fs::write(suite.path().join("kube-burner.yml"), "jobs: []").unwrap();
        std::fs::write(suite.path().join("sanity.yml"), "test: {{TEST_NAME}}\nrun: {{RUN_ID}}\n").unwrap();

        let mut config = SuiteConfig::default();
        config.engine.binary = fake_engine(suite.path(), "echo \"$@\"; echo \"env $TEST_NAME\"");

        let record = run(&definition(suite.path()), Mode::Sanity, results.path(), &config)
            .await
            .unwrap();

        assert_eq!(record.exit_code, 0);
        assert!(record.passed());
        let rendered = std::fs::read_to_string(results.path().join("sanity.yml")).unwrap();
        assert!(rendered.starts_with("test: cpu-limits\nrun: "));
        assert!(!rendered.contains("{{RUN_ID}}"));

        let log = std::fs::read_to_string(results.path().join(ENGINE_LOG)).unwrap();
        assert!(log.starts_with("init -c "));
        assert!(log.contains("--user-data"));
        assert!(log.contains("env cpu-limits"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_report_fails_the_record() {
        let suite = tempdir().unwrap();
        let results = tempdir().unwrap();
        std::fs::write(suite.path().join("kube-burner.yml"), "jobs: []").unwrap();
        std::fs::write(suite.path().join("sanity.yml"), "").unwrap();

        let report = ValidationReport::new(
            "cpu-limits",
            "cpu",
            "scale",
            Map::new(),
            vec![ValidationOutcome::fail("cpu_spec", "4 != 8")],
        );
        store::write_report(results.path(), &report).await.unwrap();

        let mut config = SuiteConfig::default();
        config.engine.binary = fake_engine(suite.path(), "exit 0");

        let record = run(&definition(suite.path()), Mode::Sanity, results.path(), &config)
            .await
            .unwrap();

        assert_eq!(record.exit_code, 0);
        assert_eq!(record.validation_status, ValidationStatus::Failed);
        assert_eq!(record.validation_files.len(), 1);
        assert!(!record.passed());
    }

    #[tokio::test]
    async fn unstartable_engine_is_recorded() {
        let suite = tempdir().unwrap();
        let results = tempdir().unwrap();
        std::fs::write(suite.path().join("kube-burner.yml"), "jobs: []").unwrap();
        std::fs::write(suite.path().join("sanity.yml"), "").unwrap();

        let mut config = SuiteConfig::default();
        config.engine.binary = suite.path().join("no-such-engine").display().to_string();

        let record = run(&definition(suite.path()), Mode::Sanity, results.path(), &config)
            .await
            .unwrap();
        assert_eq!(record.exit_code, SPAWN_FAILURE_EXIT_CODE);
    }

    #[tokio::test]
    async fn engine_log_handles_share_one_file() {
        use std::io::Write;

        let dir = tempdir().unwrap();
        let path = dir.path().join(ENGINE_LOG);
        let (mut out, mut err) = engine_log(&path).await.unwrap();
        out.write_all(b"stdout\n").unwrap();
        err.write_all(b"stderr\n").unwrap();
        drop((out, err));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "stdout\nstderr\n");

        assert!(engine_log(&dir.path().join("missing").join(ENGINE_LOG)).await.is_err());
    }
}
