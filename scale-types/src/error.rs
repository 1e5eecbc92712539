//! Error types for scale-types.

use thiserror::Error;

/// Errors from parsing the suite's enumerated values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypesError {
    /// Mode is not one of the recognized run modes.
    #[error("invalid mode '{0}': expected 'sanity' or 'full'")]
    InvalidMode(String),
}
