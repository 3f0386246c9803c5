//! Error types for the self-update bootstrap.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::checksum::ChecksumError;
use crate::transfer::TransferError;

/// Result type for bootstrap operations.
pub type BootstrapResult<T> = Result<T, BootstrapError>;

/// Errors raised while checking for or performing a self-update.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The running executable could not be located.
    #[error("cannot locate the running executable: {0}")]
    CurrentExe(#[source] io::Error),

    /// The running executable could not be hashed.
    #[error(transparent)]
    Hash(#[from] ChecksumError),

    /// The updater payload could not be written.
    #[error("failed to extract updater to {}: {source}", .path.display())]
    Extract {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A process could not be started.
    #[error("failed to launch {}: {source}", .program.display())]
    Launch {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Access was denied even though the process is already elevated.
    #[error("unable to access {}: {source}", .path.display())]
    AccessDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The stale updater could not be removed.
    #[error("failed to remove stale updater {}: {source}", .path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The updater was started with missing arguments.
    #[error("missing updater argument: {0}")]
    MissingArgument(&'static str),

    /// Downloading the new client binary failed.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// The replacement binary could not be made executable.
    #[error("failed to set permissions on {}: {source}", .path.display())]
    Permissions {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl BootstrapError {
    /// Whether the failure is a permission problem that elevation may fix.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::Extract { source, .. }
            | Self::Launch { source, .. }
            | Self::Cleanup { source, .. } => source.kind() == io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }
}
