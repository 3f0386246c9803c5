//! Sync client configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;

use super::{load_ini, parse_key, path_key, string_key, ConfigResult};
use crate::sync::{CoordinatorConfig, DEFAULT_TIMEOUT, DEFAULT_WORKERS};
use crate::transfer::{
    RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_DELAY_SECS,
};

/// Index URL used when none is configured.
pub const DEFAULT_INDEX_URL: &str = "http://127.0.0.1:7000/";

/// Sync client settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// URL serving the manifest.
    pub index_url: String,
    /// Root of the local installation.
    pub install_dir: PathBuf,
    /// Host executable used until a manifest names one.
    pub executable: Option<String>,
    /// Concurrent downloads.
    pub workers: usize,
    /// HTTP timeout per request.
    pub timeout: Duration,
    /// Attempts per file, 0 for no limit.
    pub max_retries: u32,
    /// Delay after the first failure.
    pub retry_backoff: Duration,
    /// Delay cap.
    pub retry_backoff_max: Duration,
    /// Append-only log file, if any.
    pub log_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            index_url: DEFAULT_INDEX_URL.to_string(),
            install_dir: PathBuf::from("."),
            executable: None,
            workers: DEFAULT_WORKERS,
            timeout: DEFAULT_TIMEOUT,
            max_retries: 0,
            retry_backoff: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            retry_backoff_max: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
            log_file: None,
        }
    }
}

impl ClientConfig {
    /// Load from an INI file. Relative paths resolve against the file's directory.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let ini = load_ini(path)?;
        let mut config = Self::from_ini(&ini)?;
        if let Some(base) = path.parent() {
            config.install_dir = base.join(&config.install_dir);
            config.log_file = config.log_file.map(|p| base.join(p));
        }
        Ok(config)
    }

    /// Read settings from the `[client]` section.
    pub fn from_ini(ini: &Ini) -> ConfigResult<Self> {
        let defaults = Self::default();
        let client = ini.section(Some("client"));

        let timeout_secs = parse_key(client, "client", "timeout_secs", defaults.timeout.as_secs())?;
        let backoff_ms = parse_key(
            client,
            "client",
            "retry_backoff_ms",
            defaults.retry_backoff.as_millis() as u64,
        )?;
        let backoff_max_ms = parse_key(
            client,
            "client",
            "retry_backoff_max_ms",
            defaults.retry_backoff_max.as_millis() as u64,
        )?;

        Ok(Self {
            index_url: string_key(client, "index_url").unwrap_or(defaults.index_url),
            install_dir: path_key(client, "install_dir").unwrap_or(defaults.install_dir),
            executable: string_key(client, "executable"),
            workers: parse_key(client, "client", "workers", defaults.workers)?.max(1),
            timeout: Duration::from_secs(timeout_secs),
            max_retries: parse_key(client, "client", "max_retries", defaults.max_retries)?,
            retry_backoff: Duration::from_millis(backoff_ms),
            retry_backoff_max: Duration::from_millis(backoff_max_ms),
            log_file: path_key(client, "log_file"),
        })
    }

    /// Override the index URL.
    pub fn with_index_url(mut self, url: impl Into<String>) -> Self {
        self.index_url = url.into();
        self
    }

    /// Override the install directory.
    pub fn with_install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.install_dir = dir.into();
        self
    }

    /// Override the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Override the attempt cap (0 for no limit).
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Retry policy for transfers.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::ExponentialBackoff {
            max_attempts: (self.max_retries > 0).then_some(self.max_retries),
            initial_delay: self.retry_backoff,
            max_delay: self.retry_backoff_max.max(self.retry_backoff),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    /// Settings for the download coordinator.
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig::default()
            .with_workers(self.workers)
            .with_timeout(self.timeout)
            .with_retry(self.retry_policy())
    }
}
