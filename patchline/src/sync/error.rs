//! Error types for planning and coordinating downloads.

use thiserror::Error;

use crate::manifest::ManifestError;
use crate::transfer::TransferError;

/// Result type for planning.
pub type PlanResult<T> = Result<T, PlanError>;

/// Result type for the download coordinator.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Errors that make a manifest unplannable.
#[derive(Debug, Error)]
pub enum PlanError {
    /// A verify-exclusion pattern is not a valid regular expression.
    #[error("invalid verify exclusion pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// An entry declares an algorithm this client cannot verify.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// An entry path would resolve outside the install directory.
    #[error("manifest path '{0}' escapes the install directory")]
    UnsafePath(String),
}

/// Errors raised by the coordinator itself, as opposed to per-file failures.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The shared HTTP client could not be built.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// A worker thread could not be started.
    #[error("failed to spawn download worker: {0}")]
    Spawn(#[source] std::io::Error),
}
