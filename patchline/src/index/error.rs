//! Error types for the content index.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::manifest::ManifestError;

/// Result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors raised while building or maintaining the content index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The content root does not exist or cannot be read.
    #[error("content directory {} is not usable: {source}", .path.display())]
    Root {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The tree kept changing underneath every scan attempt.
    #[error("content directory {} changed during {attempts} consecutive scans", .path.display())]
    Unstable { path: PathBuf, attempts: u32 },

    /// A filesystem watcher could not be installed.
    #[error("failed to watch {}: {source}", .path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// The manifest could not be serialized for serving.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The HTTP client used for patcher refreshes could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// A background thread could not be started.
    #[error("failed to spawn index thread: {0}")]
    Spawn(#[source] io::Error),
}
