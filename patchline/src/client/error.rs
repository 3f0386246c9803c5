//! Error types for the client session.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::bootstrap::BootstrapError;
use crate::config::ConfigError;
use crate::manifest::ManifestError;
use crate::sync::{CoordinatorError, PlanError};
use crate::transfer::TransferError;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that end a sync session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The index could not be reached.
    #[error("unable to reach {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The index answered with an error status.
    #[error("{url} answered {status}")]
    Status { url: String, status: u16 },

    /// The manifest body is not a valid manifest.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The HTTP client could not be built.
    #[error(transparent)]
    Client(#[from] TransferError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    /// Local state could not be read or written.
    #[error(transparent)]
    State(#[from] ConfigError),

    /// The install directory is not writable.
    #[error("cannot write to {}: {source}", .path.display())]
    Probe {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A relaunch could not be started.
    #[error("failed to launch {}: {source}", .program.display())]
    Launch {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
}
