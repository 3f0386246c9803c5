//! INI configuration files.
//!
//! # Server (`server.ini`)
//!
//! ```ini
//! [server]
//! bind = 0.0.0.0
//! port = 7000
//! content_dir = /srv/patchline/content
//! log_file = /var/log/patchline/server.log
//! quiescence_ms = 1000
//!
//! [manifest]
//! patcher_url = https://cdn.example.com/patchline
//! patcher_file = /srv/patchline/content/patchline
//! content_endpoint = https://cdn.example.com/content
//! executable = bin/app
//! verify_exclusion = .+\.ini$
//! verify_exclusion = ^saves/
//! ```
//!
//! # Client (`client.ini`)
//!
//! ```ini
//! [client]
//! index_url = http://127.0.0.1:7000/
//! install_dir = .
//! executable = bin/app
//! workers = 10
//! timeout_secs = 30
//! max_retries = 0
//! retry_backoff_ms = 250
//! retry_backoff_max_ms = 30000
//! log_file = patchline.log
//! ```
//!
//! Every key is optional; missing keys take the defaults shown by the
//! `Default` impls.

mod client;
mod server;

pub use client::ClientConfig;
pub use server::ServerConfig;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::{EscapePolicy, Ini, ParseOption, Properties};
use thiserror::Error;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or parsed.
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    /// A key holds a value of the wrong shape.
    #[error("invalid value '{value}' for {section}.{key}: {reason}")]
    Invalid {
        section: &'static str,
        key: &'static str,
        value: String,
        reason: String,
    },

    /// The file could not be written.
    #[error("failed to write config {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Directory holding default configuration files.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("patchline"))
}

/// Directory holding default log files.
pub fn log_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("patchline").join("logs"))
}

/// Backslashes are kept verbatim so regexes and Windows paths survive.
fn parse_option() -> ParseOption {
    ParseOption {
        enabled_escape: false,
        ..ParseOption::default()
    }
}

pub(crate) fn load_ini(path: &Path) -> ConfigResult<Ini> {
    Ini::load_from_file_opt(path, parse_option()).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn parse_ini(text: &str) -> ConfigResult<Ini> {
    Ini::load_from_str_opt(text, parse_option()).map_err(|source| ConfigError::Read {
        path: PathBuf::from("<inline>"),
        source: ini::Error::Parse(source),
    })
}

pub(crate) fn save_ini(ini: &Ini, path: &Path) -> ConfigResult<()> {
    ini.write_to_file_policy(path, EscapePolicy::Nothing)
        .map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
}

/// Parse an optional key, keeping `default` when it is absent or blank.
pub(crate) fn parse_key<T>(
    props: Option<&Properties>,
    section: &'static str,
    key: &'static str,
    default: T,
) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match props.and_then(|p| p.get(key)).map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            section,
            key,
            value: value.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Read an optional string key.
pub(crate) fn string_key(props: Option<&Properties>, key: &str) -> Option<String> {
    props
        .and_then(|p| p.get(key))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Read an optional path key.
pub(crate) fn path_key(props: Option<&Properties>, key: &str) -> Option<PathBuf> {
    string_key(props, key).map(PathBuf::from)
}
