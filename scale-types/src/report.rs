//! Validation report written once per check per test run.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::outcome::ValidationOutcome;

/// Terminal status of a whole validation report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OverallStatus {
    /// No phase failed.
    Success,
    /// At least one phase failed.
    Failed,
}

impl OverallStatus {
    /// Process exit code corresponding to this status.
    pub fn exit_code(&self) -> i32 {
        match self {
            OverallStatus::Success => 0,
            OverallStatus::Failed => 1,
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallStatus::Success => f.write_str("SUCCESS"),
            OverallStatus::Failed => f.write_str("FAILED"),
        }
    }
}

/// One check's report, persisted as `validation-<test_name>.json`.
///
/// `overall_status` is FAILED iff some outcome has status FAIL. The only
/// constructor derives it, so a report built in-process always holds that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Test this report belongs to.
    pub test_name: String,
    /// Check that produced the report (e.g. `cpu`, `running`).
    pub function: String,
    /// RFC 3339 creation time.
    pub timestamp: String,
    /// Namespace the check ran against, or `all` for cluster-wide.
    pub namespace: String,
    /// Check parameters (expected values, selectors).
    pub parameters: Map<String, Value>,
    /// Derived from `validations`.
    pub overall_status: OverallStatus,
    /// 0 for SUCCESS, 1 for FAILED.
    pub exit_code: i32,
    /// Ordered per-phase outcomes.
    pub validations: Vec<ValidationOutcome>,
}

impl ValidationReport {
    /// Build a report, deriving `overall_status` and `exit_code` from the outcomes.
    pub fn new(
        test_name: impl Into<String>,
        function: impl Into<String>,
        namespace: impl Into<String>,
        parameters: Map<String, Value>,
        validations: Vec<ValidationOutcome>,
    ) -> Self {
        let overall_status = if validations.iter().any(|v| v.status.is_failure()) {
            OverallStatus::Failed
        } else {
            OverallStatus::Success
        };

        Self {
            test_name: test_name.into(),
            function: function.into(),
            timestamp: crate::now_rfc3339(),
            namespace: namespace.into(),
            parameters,
            overall_status,
            exit_code: overall_status.exit_code(),
            validations,
        }
    }

    /// True if the report passed.
    pub fn is_success(&self) -> bool {
        self.overall_status == OverallStatus::Success
    }

    /// Outcome for the named phase, if that phase ran.
    pub fn phase(&self, name: &str) -> Option<&ValidationOutcome> {
        self.validations.iter().find(|v| v.phase == name)
    }

    /// File name this report is persisted under.
    pub fn file_name(test_name: &str) -> String {
        format!("validation-{}.json", test_name)
    }
}
