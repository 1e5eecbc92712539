//! # scale-core
//!
//! Pure validation logic for the VM scale suite (no I/O, instant tests).
//!
//! ## Design Philosophy
//!
//! Everything here takes input and produces output without touching the
//! cluster, the network, the filesystem or the clock:
//! - [`retry`]: bounded-attempt retry as a state machine emitting actions
//! - [`sampling`]: sample sizing, uniform selection and classification
//! - [`quantity`]: magnitude strings (`64Gi`) and tolerance bands
//! - [`phase`]: multi-phase check log with short-circuit on FAIL
//! - [`summary`]: suite-level rows derived from execution records
//!
//! `scale-probe` interprets the retry actions against a real or fake clock
//! and feeds probe results back in.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod phase;
pub mod quantity;
pub mod retry;
pub mod sampling;
pub mod summary;

pub use phase::PhaseLog;
pub use quantity::{
    parse_quantity, within_tolerance, QuantityError, DISK_TOLERANCE_PCT, MEMORY_TOLERANCE_PCT,
};
pub use retry::{ProbeEvent, RetryAction, RetryError, RetryPolicy, RetryState, RetryVerdict};
pub use sampling::{sample_size, select_sample, SampleTally, SamplingConfig, SamplingError};
pub use summary::{classify_reports, format_duration, RowStatus, SuiteRow, SuiteSummary};
