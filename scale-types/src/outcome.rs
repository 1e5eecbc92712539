//! Per-phase validation outcome.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Status of a single validation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// Phase held.
    Pass,
    /// Hard mismatch. Forces the report to FAILED.
    Fail,
    /// Phase could not run (optional check unavailable).
    Skip,
    /// Some sampled units did not respond. Informational only.
    Partial,
}

impl Status {
    /// Uppercase name as written to JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pass => "PASS",
            Status::Fail => "FAIL",
            Status::Skip => "SKIP",
            Status::Partial => "PARTIAL",
        }
    }

    /// Only FAIL affects the overall report status.
    pub fn is_failure(&self) -> bool {
        matches!(self, Status::Fail)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one named validation phase.
///
/// Immutable once built; the builder-style `with_*` methods consume `self`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Phase name, e.g. `discovery`, `cpu_spec`, `ssh_sample`.
    pub phase: String,
    /// Phase status.
    pub status: Status,
    /// Human-readable explanation.
    pub message: String,
    /// Phase duration in seconds.
    pub duration: f64,
    /// Free-form phase details (counts, observed values).
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl ValidationOutcome {
    /// Create an outcome with no duration and no extra fields.
    pub fn new(phase: impl Into<String>, status: Status, message: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            status,
            message: message.into(),
            duration: 0.0,
            extra: Map::new(),
        }
    }

    /// Passing outcome.
    pub fn pass(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(phase, Status::Pass, message)
    }

    /// Failing outcome.
    pub fn fail(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(phase, Status::Fail, message)
    }

    /// Skipped outcome.
    pub fn skip(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(phase, Status::Skip, message)
    }

    /// Partial outcome.
    pub fn partial(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(phase, Status::Partial, message)
    }

    /// Attach the measured phase duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration.as_secs_f64();
        self
    }

    /// Attach one extra detail field.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}
