//! CLI error type.

use patchline::bootstrap::BootstrapError;
use patchline::client::SessionError;
use patchline::config::ConfigError;
use patchline::index::IndexError;
use patchline::logging::LoggingError;
use patchline::server::ServerError;
use thiserror::Error;

/// Errors that end a command with a non-zero exit code.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    ConfigFile(#[from] ConfigError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("Sync error: {0}")]
    Session(#[from] SessionError),

    #[error("Update error: {0}")]
    Update(#[from] BootstrapError),

    #[error("Runtime error: {0}")]
    Runtime(#[source] std::io::Error),
}
