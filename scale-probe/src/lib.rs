//! # scale-probe
//!
//! Retried, sampled state checks against a KubeVirt cluster.
//!
//! ## Architecture
//!
//! ```text
//!   CheckKind::run ──► PhaseLog (scale-core)
//!        │
//!        ├── ClusterClient ── kubectl get/delete (JSON)
//!        ├── RemoteExec ───── virtctl ssh (key or password)
//!        └── Clock ────────── tokio sleep / fake clock in tests
//!
//!   run_validation = retry(CheckKind::run + write_report)
//! ```
//!
//! The retry driver and the sampling validator own every wait, through the
//! [`Clock`] trait, so tests exercise the full 130-attempt policy without
//! sleeping.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checks;
pub mod clock;
pub mod cluster;
pub mod error;
pub mod mock;
pub mod remote;
pub mod retry;
pub mod sampling;
pub mod store;

pub use checks::{run_validation, CheckContext, CheckKind, CheckParams, ValidationRun};
pub use clock::{Clock, FakeClock, TokioClock};
pub use cluster::{ClusterClient, KubectlClient, Scope};
pub use error::{ProbeError, RemoteError, StoreError};
pub use mock::{MockCluster, MockRemote};
pub use remote::{Credentials, RemoteExec, VirtctlSsh};
pub use retry::retry;
pub use sampling::{probe_with_retries, validate_sample, SampleReport};
