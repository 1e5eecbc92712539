//! # scale-types
//!
//! Report and record types for the VM scale validation suite.
//!
//! This crate defines the JSON artifacts that every other crate produces or
//! reads back:
//! - [`ValidationOutcome`]: one per validation phase
//! - [`ValidationReport`]: one per check per test run (`validation-<test>.json`)
//! - [`TestExecutionRecord`]: one per execution unit (`summary.json`)
//!
//! Execution units never share memory with the orchestrator. These files are
//! the only channel between them, so their schema is kept stable here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod mode;
pub mod outcome;
pub mod record;
pub mod report;
pub mod unit;

pub use error::TypesError;
pub use mode::Mode;
pub use outcome::{Status, ValidationOutcome};
pub use record::{TestExecutionRecord, ValidationStatus, NO_SUMMARY_EXIT_CODE, SUMMARY_FILE};
pub use report::{OverallStatus, ValidationReport};
pub use unit::UnitRef;

/// Current UTC time as an RFC 3339 string, the timestamp format used in every artifact.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
