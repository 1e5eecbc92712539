//! Multi-phase check log.
//!
//! A check walks Discovery → Spec → Guest → Workload signature. Each phase
//! appends one outcome. The first FAIL breaks the log: later phases must not
//! run, and `record` tells the caller so.

use scale_types::{Status, ValidationOutcome, ValidationReport};
use serde_json::{Map, Value};

/// Ordered phase outcomes of one check run.
#[derive(Debug, Clone, Default)]
pub struct PhaseLog {
    outcomes: Vec<ValidationOutcome>,
    broken: bool,
}

impl PhaseLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an outcome. Returns `false` once a FAIL has been recorded.
    ///
    /// Outcomes recorded after the log broke are dropped.
    pub fn record(&mut self, outcome: ValidationOutcome) -> bool {
        if self.broken {
            return false;
        }
        if outcome.status == Status::Fail {
            self.broken = true;
        }
        self.outcomes.push(outcome);
        !self.broken
    }

    /// True once a phase failed.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Outcomes so far.
    pub fn outcomes(&self) -> &[ValidationOutcome] {
        &self.outcomes
    }

    /// Close the log into a report.
    pub fn into_report(
        self,
        test_name: &str,
        function: &str,
        namespace: &str,
        parameters: Map<String, Value>,
    ) -> ValidationReport {
        ValidationReport::new(test_name, function, namespace, parameters, self.outcomes)
    }
}
