//! Options and helpers shared across commands.

use std::path::{Path, PathBuf};

use clap::Args;
use patchline::config::{config_dir, ClientConfig};
use patchline::logging::{init_logging, LogConfig, LogGuard};

use crate::error::CliError;

/// Default client config file name.
pub const CLIENT_CONFIG: &str = "client.ini";

/// Default server config file name.
pub const SERVER_CONFIG: &str = "server.ini";

/// Client options shared by `sync` and `update`.
#[derive(Debug, Clone, Default, Args)]
pub struct ClientOptions {
    /// Client config file (default: <config dir>/patchline/client.ini)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// URL of the content index
    #[arg(long)]
    pub index_url: Option<String>,

    /// Installation directory (default: directory of this executable)
    #[arg(long)]
    pub install_dir: Option<PathBuf>,
}

impl ClientOptions {
    /// Config file in use, if any.
    pub fn config_path(&self) -> Option<PathBuf> {
        resolve_config_path(self.config.as_deref(), CLIENT_CONFIG)
    }

    /// Load the client config and apply command-line overrides.
    pub fn load(&self, current_exe: &Path) -> Result<ClientConfig, CliError> {
        let config_path = self.config_path();
        let mut config = match &config_path {
            Some(path) => ClientConfig::load(path)?,
            None => ClientConfig::default(),
        };

        if let Some(url) = &self.index_url {
            config.index_url = url.clone();
        }
        match &self.install_dir {
            Some(dir) => config.install_dir = absolute(dir)?,
            None if config_path.is_none() => {
                if let Some(dir) = current_exe.parent() {
                    config.install_dir = dir.to_path_buf();
                }
            }
            None => config.install_dir = absolute(&config.install_dir)?,
        }
        Ok(config)
    }

    /// Options that reproduce `config` in a relaunched process.
    pub fn relaunch_args(&self, config: &ClientConfig) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(path) = self.config_path() {
            args.push("--config".to_string());
            args.push(absolute(&path).unwrap_or(path).to_string_lossy().into_owned());
        }
        args.push("--index-url".to_string());
        args.push(config.index_url.clone());
        args.push("--install-dir".to_string());
        args.push(config.install_dir.to_string_lossy().into_owned());
        args
    }
}

/// `<subcommand> <options...>`.
pub fn prefixed(subcommand: &str, options: &[String]) -> Vec<String> {
    let mut args = vec![subcommand.to_string()];
    args.extend(options.iter().cloned());
    args
}

/// The explicit path, or `name` in the default config directory if it exists.
pub fn resolve_config_path(explicit: Option<&Path>, name: &str) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => config_dir()
            .map(|dir| dir.join(name))
            .filter(|path| path.is_file()),
    }
}

/// Install logging for a command.
pub fn start_logging(file: Option<PathBuf>, verbose: bool) -> Result<LogGuard, CliError> {
    Ok(init_logging(
        LogConfig::default().with_file(file).with_verbose(verbose),
    )?)
}

fn absolute(path: &Path) -> Result<PathBuf, CliError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(CliError::Runtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_install_dir_defaults_to_exe_dir() {
        let temp = TempDir::new().unwrap();
        let exe = temp.path().join("patchline");

        let config = ClientOptions::default().load(&exe).unwrap();

        assert_eq!(config.install_dir, temp.path());
    }

    #[test]
    fn test_overrides_and_relaunch_args() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("client.ini");
        fs::write(&path, "[client]\nindex_url = http://a/\ninstall_dir = game\n").unwrap();

        let options = ClientOptions {
            config: Some(path.clone()),
            index_url: Some("http://b/".into()),
            install_dir: None,
        };
        let config = options.load(&temp.path().join("patchline")).unwrap();

        assert_eq!(config.index_url, "http://b/");
        assert_eq!(config.install_dir, temp.path().join("game"));
        assert_eq!(
            options.relaunch_args(&config),
            vec![
                "--config".to_string(),
                path.to_string_lossy().into_owned(),
                "--index-url".to_string(),
                "http://b/".to_string(),
                "--install-dir".to_string(),
                temp.path().join("game").to_string_lossy().into_owned(),
            ]
        );
    }

    #[test]
    fn test_prefixed() {
        assert_eq!(
            prefixed("sync", &["--x".to_string()]),
            vec!["sync".to_string(), "--x".to_string()]
        );
    }
}
