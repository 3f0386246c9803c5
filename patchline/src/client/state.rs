//! Local state persisted between client runs.

use std::path::{Path, PathBuf};

use ini::Ini;
use tracing::debug;

use crate::config::{load_ini, save_ini, string_key, ConfigResult};

/// File name of the state file inside the install directory.
pub const STATE_FILE: &str = "patchline-state.ini";

/// What the client remembers about the last successful sync.
///
/// The host executable is needed before the manifest is fetched, so the
/// manifest's value is kept here for the next start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalState {
    /// Relative path of the host executable.
    pub executable: Option<String>,
}

impl LocalState {
    /// Location of the state file for `install_dir`.
    pub fn path(install_dir: &Path) -> PathBuf {
        install_dir.join(STATE_FILE)
    }

    /// Load state, defaulting when the file does not exist.
    pub fn load(install_dir: &Path) -> ConfigResult<Self> {
        let path = Self::path(install_dir);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let ini = load_ini(&path)?;
        Ok(Self {
            executable: string_key(ini.section(Some("host")), "executable"),
        })
    }

    /// Write state to `install_dir`.
    pub fn save(&self, install_dir: &Path) -> ConfigResult<()> {
        let mut ini = Ini::new();
        if let Some(executable) = &self.executable {
            ini.with_section(Some("host"))
                .set("executable", executable.as_str());
        }
        let path = Self::path(install_dir);
        save_ini(&ini, &path)?;
        debug!(path = %path.display(), "Saved local state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_default() {
        let temp = TempDir::new().unwrap();
        assert_eq!(LocalState::load(temp.path()).unwrap(), LocalState::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let state = LocalState {
            executable: Some("bin/app.exe".into()),
        };

        state.save(temp.path()).unwrap();

        assert!(temp.path().join(STATE_FILE).is_file());
        assert_eq!(LocalState::load(temp.path()).unwrap(), state);
    }
}
