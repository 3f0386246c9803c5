//! Index server configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;

use super::{load_ini, parse_key, path_key, string_key, ConfigResult};
use crate::index::{IndexConfig, DEFAULT_QUIESCENCE};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 7000;

/// Index server settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind: IpAddr,
    /// Port to listen on.
    pub port: u16,
    /// Directory whose content is published.
    pub content_dir: PathBuf,
    /// Append-only log file, if any.
    pub log_file: Option<PathBuf>,
    /// Idle window before replayed changes are published.
    pub quiescence: Duration,
    /// URL of the published client binary.
    pub patcher_url: String,
    /// Local copy of the client binary to watch.
    pub patcher_file: Option<PathBuf>,
    /// Base URL for content downloads.
    pub content_endpoint: String,
    /// Host executable, relative to the install directory.
    pub executable: String,
    /// Paths clients trust without re-hashing.
    pub verify_exclusion: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            content_dir: PathBuf::from("content"),
            log_file: None,
            quiescence: DEFAULT_QUIESCENCE,
            patcher_url: String::new(),
            patcher_file: None,
            content_endpoint: String::new(),
            executable: String::new(),
            verify_exclusion: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load from an INI file. Relative paths resolve against the file's directory.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let ini = load_ini(path)?;
        let mut config = Self::from_ini(&ini)?;
        if let Some(base) = path.parent() {
            config.content_dir = base.join(&config.content_dir);
            config.log_file = config.log_file.map(|p| base.join(p));
            config.patcher_file = config.patcher_file.map(|p| base.join(p));
        }
        Ok(config)
    }

    /// Read settings from parsed INI sections.
    pub fn from_ini(ini: &Ini) -> ConfigResult<Self> {
        let defaults = Self::default();
        let server = ini.section(Some("server"));
        let manifest = ini.section(Some("manifest"));

        let quiescence_ms = parse_key(
            server,
            "server",
            "quiescence_ms",
            defaults.quiescence.as_millis() as u64,
        )?;

        Ok(Self {
            bind: parse_key(server, "server", "bind", defaults.bind)?,
            port: parse_key(server, "server", "port", defaults.port)?,
            content_dir: path_key(server, "content_dir").unwrap_or(defaults.content_dir),
            log_file: path_key(server, "log_file"),
            quiescence: Duration::from_millis(quiescence_ms),
            patcher_url: string_key(manifest, "patcher_url").unwrap_or_default(),
            patcher_file: path_key(manifest, "patcher_file"),
            content_endpoint: string_key(manifest, "content_endpoint")
                .or_else(|| string_key(manifest, "content_end_point"))
                .unwrap_or_default(),
            executable: string_key(manifest, "executable").unwrap_or_default(),
            verify_exclusion: manifest
                .map(|p| {
                    p.get_all("verify_exclusion")
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    /// Override the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Override the content directory.
    pub fn with_content_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.content_dir = dir.into();
        self
    }

    /// Override the log file.
    pub fn with_log_file(mut self, path: Option<PathBuf>) -> Self {
        self.log_file = path;
        self
    }

    /// Socket address to listen on.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Settings for the content index.
    pub fn index_config(&self) -> IndexConfig {
        IndexConfig::new(&self.content_dir)
            .with_patcher_url(self.patcher_url.clone())
            .with_patcher_file(self.patcher_file.clone())
            .with_content_endpoint(self.content_endpoint.clone())
            .with_executable(self.executable.clone())
            .with_verify_exclusion(self.verify_exclusion.clone())
            .with_quiescence(self.quiescence)
    }
}
