//! Suite-level summary derived from execution records.
//!
//! Pure functions of their input: the same records always render the same
//! rows and the same table.

use scale_types::{TestExecutionRecord, ValidationReport, ValidationStatus};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Classify the reports discovered for one run.
pub fn classify_reports<'a, I>(reports: I) -> ValidationStatus
where
    I: IntoIterator<Item = &'a ValidationReport>,
{
    let mut seen = false;
    for report in reports {
        seen = true;
        if !report.is_success() {
            return ValidationStatus::Failed;
        }
    }
    if seen {
        ValidationStatus::Success
    } else {
        ValidationStatus::NoReports
    }
}

/// Suite-level status of one test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowStatus {
    /// Engine succeeded and no report failed.
    Pass,
    /// Engine or a validation failed.
    Fail,
    /// Execution unit left no record.
    NoSummary,
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowStatus::Pass => f.write_str("PASS"),
            RowStatus::Fail => f.write_str("FAIL"),
            RowStatus::NoSummary => f.write_str("NO_SUMMARY"),
        }
    }
}

/// One summary table row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuiteRow {
    /// Test name.
    pub test: String,
    /// Suite-level status.
    pub status: RowStatus,
    /// Validation classification.
    pub validation: ValidationStatus,
    /// Engine exit code or sentinel.
    pub exit_code: i32,
    /// Wall-clock seconds.
    pub duration_seconds: f64,
    /// Results directory.
    pub results_path: PathBuf,
    /// Validation report files.
    pub validation_files: Vec<PathBuf>,
}

impl From<&TestExecutionRecord> for SuiteRow {
    fn from(record: &TestExecutionRecord) -> Self {
        let status = if record.is_missing() {
            RowStatus::NoSummary
        } else if record.passed() {
            RowStatus::Pass
        } else {
            RowStatus::Fail
        };
        Self {
            test: record.test.clone(),
            status,
            validation: record.validation_status,
            exit_code: record.exit_code,
            duration_seconds: record.duration_seconds,
            results_path: record.results_path.clone(),
            validation_files: record.validation_files.clone(),
        }
    }
}

/// Summary of a whole suite run, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SuiteSummary {
    /// One row per executed test.
    pub rows: Vec<SuiteRow>,
}

impl SuiteSummary {
    /// Derive the summary from records.
    pub fn from_records(records: &[TestExecutionRecord]) -> Self {
        Self {
            rows: records.iter().map(SuiteRow::from).collect(),
        }
    }

    /// True if every test passed.
    pub fn all_passed(&self) -> bool {
        self.rows.iter().all(|r| r.status == RowStatus::Pass)
    }

    /// Tests that did not pass.
    pub fn failed_tests(&self) -> Vec<&str> {
        self.rows
            .iter()
            .filter(|r| r.status != RowStatus::Pass)
            .map(|r| r.test.as_str())
            .collect()
    }

    /// Suite process exit code: 0 if everything passed, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.all_passed() {
            0
        } else {
            1
        }
    }

    /// Render a fixed-width table.
    pub fn render_table(&self) -> String {
        let headers = ["TEST", "STATUS", "VALIDATION", "EXIT", "DURATION", "RESULTS"];
        let cells: Vec<[String; 6]> = self
            .rows
            .iter()
            .map(|r| {
                [
                    r.test.clone(),
                    r.status.to_string(),
                    r.validation.to_string(),
                    r.exit_code.to_string(),
                    format_duration(r.duration_seconds),
                    r.results_path.display().to_string(),
                ]
            })
            .collect();

        let mut widths = headers.map(str::len);
        for row in &cells {
            for (w, cell) in widths.iter_mut().zip(row.iter()) {
                *w = (*w).max(cell.len());
            }
        }

        let mut out = String::new();
        let header_row = headers.map(String::from);
        for row in std::iter::once(&header_row).chain(cells.iter()) {
            let line: Vec<String> = row
                .iter()
                .zip(widths.iter())
                .map(|(cell, w)| format!("{:<width$}", cell, width = *w))
                .collect();
            out.push_str(line.join("  ").trim_end());
            out.push('\n');
        }

        let passed = self
            .rows
            .iter()
            .filter(|r| r.status == RowStatus::Pass)
            .count();
        out.push_str(&format!("\n{}/{} tests passed\n", passed, self.rows.len()));
        out
    }
}

/// Format seconds as `45s`, `3m05s` or `1h02m03s`.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}h{:02}m{:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m{:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}
