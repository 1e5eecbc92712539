//! Per-run execution record written by each execution unit (`summary.json`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::mode::Mode;

/// Exit code reported for a test whose execution unit left no record.
pub const NO_SUMMARY_EXIT_CODE: i32 = 999;

/// File name of the per-run record inside a results directory.
pub const SUMMARY_FILE: &str = "summary.json";

/// Classification of the validation reports found for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    /// Every discovered report succeeded.
    Success,
    /// At least one report failed.
    Failed,
    /// The engine ran but produced no validation reports.
    NoReports,
    /// The execution unit never wrote a record.
    NoSummary,
}

impl ValidationStatus {
    /// Uppercase name as written to JSON and the summary table.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Success => "SUCCESS",
            ValidationStatus::Failed => "FAILED",
            ValidationStatus::NoReports => "NO_REPORTS",
            ValidationStatus::NoSummary => "NO_SUMMARY",
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one execution unit, read back by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestExecutionRecord {
    /// Test name (registry key).
    pub test: String,
    /// Mode the test ran in.
    pub mode: Mode,
    /// Provisioning engine exit code, or [`NO_SUMMARY_EXIT_CODE`].
    pub exit_code: i32,
    /// Unique results directory of this run.
    pub results_path: PathBuf,
    /// Raw engine log.
    pub kube_burner_log: PathBuf,
    /// Classification of the discovered validation reports.
    pub validation_status: ValidationStatus,
    /// Paths of every discovered validation report.
    pub validation_files: Vec<PathBuf>,
    /// Wall-clock duration of the run.
    pub duration_seconds: f64,
    /// RFC 3339 time the record was written.
    pub timestamp: String,
}

impl TestExecutionRecord {
    /// Sentinel record for a unit that terminated without writing `summary.json`.
    pub fn missing(test: &str, mode: Mode, results_path: PathBuf) -> Self {
        Self {
            test: test.to_string(),
            mode,
            exit_code: NO_SUMMARY_EXIT_CODE,
            kube_burner_log: results_path.join("kube-burner.log"),
            results_path,
            validation_status: ValidationStatus::NoSummary,
            validation_files: Vec::new(),
            duration_seconds: 0.0,
            timestamp: crate::now_rfc3339(),
        }
    }

    /// True if this record stands in for a missing one.
    pub fn is_missing(&self) -> bool {
        self.validation_status == ValidationStatus::NoSummary
    }

    /// A run passes when the engine exited 0 and no validation report failed.
    pub fn passed(&self) -> bool {
        self.exit_code == 0
            && matches!(
                self.validation_status,
                ValidationStatus::Success | ValidationStatus::NoReports
            )
    }
}
