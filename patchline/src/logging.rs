//! Logging setup.
//!
//! Log lines go to stderr and, when configured, are appended to a log file
//! through a non-blocking writer. The returned [`LogGuard`] flushes the file
//! writer on drop and must be held for the lifetime of the process.
//!
//! Filtering follows `RUST_LOG` and falls back to `info` for this crate.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info";

/// Filter used when `RUST_LOG` is unset and verbose output was requested.
const VERBOSE_FILTER: &str = "info,patchline=debug,patchline_cli=debug";

/// Errors installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {}: {source}", .path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to open log file {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: tracing_appender::rolling::InitError,
    },

    #[error("a global subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] tracing_subscriber::util::TryInitError),
}

/// Logging options.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// File to append to, in addition to stderr.
    pub file: Option<PathBuf>,
    /// Enable debug output for patchline crates.
    pub verbose: bool,
}

impl LogConfig {
    /// Append to `path` as well as stderr.
    pub fn with_file(mut self, path: Option<PathBuf>) -> Self {
        self.file = path;
        self
    }

    /// Enable debug output.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Keeps the file writer alive.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber.
pub fn init_logging(config: LogConfig) -> Result<LogGuard, LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if config.verbose {
            VERBOSE_FILTER
        } else {
            DEFAULT_FILTER
        })
    });

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_timer(LocalTime::rfc_3339())
        .with_target(false);

    let (file_layer, guard) = match config.file.as_deref() {
        Some(path) => {
            let appender = open_appender(path)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_timer(LocalTime::rfc_3339())
                .with_ansi(false)
                .with_thread_names(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(LogGuard { _file: guard })
}

/// Append-only appender for a single file.
fn open_appender(path: &Path) -> Result<RollingFileAppender, LoggingError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|source| LoggingError::Directory {
        path: dir.clone(),
        source,
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "patchline.log".to_string());

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(&dir)
        .map_err(|source| LoggingError::File {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_appender_creates_directory() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("logs").join("client.log");

        let appender = open_appender(&path);

        assert!(appender.is_ok());
        assert!(temp.path().join("logs").is_dir());
    }

    #[test]
    fn test_config_builder() {
        let config = LogConfig::default()
            .with_file(Some(PathBuf::from("a.log")))
            .with_verbose(true);

        assert_eq!(config.file.as_deref(), Some(Path::new("a.log")));
        assert!(config.verbose);
    }
}
