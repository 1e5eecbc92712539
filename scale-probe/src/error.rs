//! Error types for scale-probe.
//!
//! Probe failures are not errors: a failing check produces FAIL or SKIP
//! outcomes. These enums cover infrastructure faults only.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the cluster client.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Could not spawn the client binary.
    #[error("spawn error for {program}: {source}")]
    Spawn {
        /// Binary that failed to start.
        program: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Client returned a non-zero exit code.
    #[error("{program} failed: exit={exit_code}, stderr={stderr}")]
    CommandFailed {
        /// Binary that was run.
        program: String,
        /// Exit code (-1 if killed by a signal).
        exit_code: i32,
        /// Standard error output.
        stderr: String,
    },

    /// Client did not finish in time.
    #[error("{program} timed out after {seconds}s")]
    Timeout {
        /// Binary that was run.
        program: String,
        /// Timeout that elapsed.
        seconds: u64,
    },

    /// Client output was not the JSON we expected.
    #[error("invalid JSON from cluster: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON parsed but lacked the `items` list.
    #[error("unexpected cluster response: {0}")]
    UnexpectedResponse(String),
}

/// Errors from remote command execution inside a unit.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Could not spawn the ssh client.
    #[error("remote spawn error: {0}")]
    Spawn(#[from] std::io::Error),

    /// Connection or command did not finish within the bound.
    #[error("remote command on {unit} timed out after {seconds}s")]
    Timeout {
        /// Target unit.
        unit: String,
        /// Bound that elapsed.
        seconds: u64,
    },

    /// Remote command returned non-zero (includes ssh connection failures).
    #[error("remote command failed on {unit}: exit={exit_code}, stderr={stderr}")]
    CommandFailed {
        /// Target unit.
        unit: String,
        /// Exit code.
        exit_code: i32,
        /// Standard error output.
        stderr: String,
    },
}

/// Errors persisting or reading JSON artifacts.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem error.
    #[error("io error on {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Artifact exists but does not parse.
    #[error("invalid JSON in {path}: {source}")]
    Json {
        /// Path being parsed.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
