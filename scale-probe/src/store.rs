//! Durable JSON artifacts: validation reports and execution records.
//!
//! Writes go to a temp file in the same directory followed by a rename, so
//! a reader never observes a partially-written artifact.

use scale_types::{TestExecutionRecord, ValidationReport, SUMMARY_FILE};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// Serialize `value` as pretty JSON and atomically place it at `path`.
///
/// The temp file is removed if writing or renaming fails.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let contents = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| StoreError::io(&dir, e))?;

    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || persist_in(&dir, &target, &contents))
        .await
        .map_err(|e| StoreError::io(path, std::io::Error::new(std::io::ErrorKind::Other, e)))?
}

fn persist_in(dir: &Path, target: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".artifact-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| StoreError::io(dir, e))?;
    tmp.write_all(contents)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.persist(target)
        .map_err(|e| StoreError::io(target, e.error))?;
    Ok(())
}

/// Read and parse a JSON artifact.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let contents = tokio::fs::read(path)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    serde_json::from_slice(&contents).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Path of the report for `test_name` inside `results_dir`.
pub fn report_path(results_dir: &Path, test_name: &str) -> PathBuf {
    results_dir.join(ValidationReport::file_name(test_name))
}

/// Persist a report, replacing any previous attempt's report.
pub async fn write_report(
    results_dir: &Path,
    report: &ValidationReport,
) -> Result<PathBuf, StoreError> {
    let path = report_path(results_dir, &report.test_name);
    write_json_atomic(&path, report).await?;
    Ok(path)
}

/// Path of the execution record inside a run directory.
pub fn record_path(results_dir: &Path) -> PathBuf {
    results_dir.join(SUMMARY_FILE)
}

/// Persist an execution record.
pub async fn write_record(
    results_dir: &Path,
    record: &TestExecutionRecord,
) -> Result<PathBuf, StoreError> {
    let path = record_path(results_dir);
    write_json_atomic(&path, record).await?;
    Ok(path)
}

/// Read an execution record. `Ok(None)` when the unit never wrote one.
pub async fn read_record(results_dir: &Path) -> Result<Option<TestExecutionRecord>, StoreError> {
    let path = record_path(results_dir);
    match tokio::fs::try_exists(&path).await {
        Ok(true) => read_json(&path).await.map(Some),
        Ok(false) => Ok(None),
        Err(e) => Err(StoreError::io(&path, e)),
    }
}

fn is_report_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with("validation-") && n.ends_with(".json"))
        .unwrap_or(false)
}

/// Find every `validation-*.json` under `root`, sorted by path.
///
/// Files that fail to parse are logged and skipped.
pub async fn discover_reports(
    root: &Path,
) -> Result<Vec<(PathBuf, ValidationReport)>, StoreError> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(StoreError::io(&dir, e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&dir, e))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| StoreError::io(&path, e))?;
            if file_type.is_dir() {
                pending.push(path);
            } else if is_report_file(&path) {
                match read_json::<ValidationReport>(&path).await {
                    Ok(report) => found.push((path, report)),
                    Err(e) => tracing::warn!("skipping unreadable report: {}", e),
                }
            }
        }
    }

    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scale_types::{Mode, ValidationOutcome, ValidationStatus};
    use serde_json::Map;
    use tempfile::tempdir;

    fn report(test: &str, outcome: ValidationOutcome) -> ValidationReport {
        ValidationReport::new(test, "cpu", "ns", Map::new(), vec![outcome])
    }

    #[tokio::test]
    async fn report_overwritten_by_later_attempt() {
        let dir = tempdir().unwrap();
        write_report(dir.path(), &report("t", ValidationOutcome::fail("cpu_spec", "4 != 8")))
            .await
            .unwrap();
        let path = write_report(dir.path(), &report("t", ValidationOutcome::pass("cpu_spec", "ok")))
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("validation-t.json"));
        let back: ValidationReport = read_json(&path).await.unwrap();
        assert!(back.is_success());

        // No temp files left behind.
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[tokio::test]
    async fn failed_write_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let occupied = dir.path().join("validation-t.json");
        std::fs::create_dir(&occupied).unwrap();
        std::fs::write(occupied.join("keep"), b"x").unwrap();

        let err = write_json_atomic(&occupied, &serde_json::json!({"a": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { ref path, .. } if path == &occupied));

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("validation-t.json")]);
        assert!(occupied.join("keep").is_file());
    }

    #[tokio::test]
    async fn record_missing_vs_present() {
        let dir = tempdir().unwrap();
        assert!(read_record(dir.path()).await.unwrap().is_none());

        let mut record = TestExecutionRecord::missing("t", Mode::Sanity, dir.path().to_path_buf());
        record.exit_code = 0;
        record.validation_status = ValidationStatus::Success;
        write_record(dir.path(), &record).await.unwrap();

        let back = read_record(dir.path()).await.unwrap().unwrap();
        assert_eq!(back, record);
    }

    #[tokio::test]
    async fn corrupt_record_is_an_error() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("summary.json"), b"{truncated")
            .await
            .unwrap();
        assert!(matches!(
            read_record(dir.path()).await,
            Err(StoreError::Json { .. })
        ));
    }

    #[tokio::test]
    async fn discovers_nested_reports_sorted() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("iteration-2");
        write_report(&nested, &report("b", ValidationOutcome::pass("p", "")))
            .await
            .unwrap();
        write_report(dir.path(), &report("a", ValidationOutcome::pass("p", "")))
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("validation-broken.json"), b"nope")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("kube-burner.log"), b"log")
            .await
            .unwrap();

        let found = discover_reports(dir.path()).await.unwrap();
        let names: Vec<&str> = found.iter().map(|(_, r)| r.test_name.as_str()).collect();
        assert_eq!(found.len(), 2);
        assert!(names.contains(&"a") && names.contains(&"b"));
        assert!(found.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[tokio::test]
    async fn discover_in_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        let found = discover_reports(&dir.path().join("nope")).await.unwrap();
        assert!(found.is_empty());
    }
}
