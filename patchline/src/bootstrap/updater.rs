//! Hand-off to, and execution of, the updater helper.
//!
//! A running binary cannot reliably overwrite itself, so the client copies
//! itself to a sibling path and starts that copy in updater mode:
//!
//! ```text
//! client ──extract──► <dir>/<name>-updater[.exe]
//!        ──spawn────► updater <target> <patcher-url> [noStartup] <args...>
//!        ──exit
//!
//! updater ──TransferEngine──► <target>   (Waiting covers the exiting client)
//!         ──spawn───────────► <target> [noStartup] <args...>
//!
//! next client start ──► deletes <dir>/<name>-updater[.exe]
//! ```

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use tracing::{debug, info, warn};

use super::error::{BootstrapError, BootstrapResult};
use super::launcher::{Elevation, ProcessLauncher};
use crate::transfer::{wait_until_released, CancelFlag, RetryPolicy, TransferEngine};

/// First argument that suppresses launching the host before syncing.
pub const NO_STARTUP: &str = "noStartup";

/// Poll interval while waiting for a file to be released.
const RELEASE_POLL: Duration = Duration::from_secs(1);

/// Location of the extracted updater helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdaterPayload {
    path: PathBuf,
}

impl UpdaterPayload {
    /// Payload at an explicit path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Payload next to `exe`, named `<stem>-updater<ext>`.
    pub fn beside(exe: &Path) -> Self {
        let stem = exe
            .file_stem()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("patchline"));
        let mut name = stem;
        name.push("-updater");
        if let Some(ext) = exe.extension() {
            name.push(".");
            name.push(ext);
        }
        Self {
            path: exe.with_file_name(name),
        }
    }

    /// Path the helper is extracted to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the helper binary, a copy of `source`.
    pub fn extract(&self, source: &Path) -> BootstrapResult<()> {
        fs::copy(source, &self.path).map_err(|e| BootstrapError::Extract {
            path: self.path.clone(),
            source: e,
        })?;
        debug!(path = %self.path.display(), "Updater extracted");
        Ok(())
    }
}

/// Delete a helper left behind by a previous self-update.
///
/// Waits while the helper is still running. Returns whether a file was
/// removed.
pub fn cleanup_stale_updater(payload: &UpdaterPayload) -> BootstrapResult<bool> {
    let path = payload.path();
    if !path.exists() {
        return Ok(false);
    }

    let never = CancelFlag::new();
    let _ = wait_until_released(path, RELEASE_POLL, &never);

    match fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "Removed stale updater");
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(BootstrapError::Cleanup {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Positional arguments of the updater helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdaterArgs {
    /// Client binary to replace and relaunch.
    pub target: PathBuf,
    /// URL of the published client binary.
    pub url: String,
    /// Whether the relaunched client should skip the pre-sync host launch.
    pub no_startup: bool,
    /// Arguments passed through to the relaunched client.
    pub passthrough: Vec<String>,
}

impl UpdaterArgs {
    /// Parse `<target> <url> [noStartup] <args...>`.
    pub fn parse<I, S>(args: I) -> BootstrapResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = args.into_iter().map(Into::into);
        let target = args
            .next()
            .ok_or(BootstrapError::MissingArgument("target executable"))?;
        let url = args
            .next()
            .ok_or(BootstrapError::MissingArgument("patcher url"))?;
        let mut rest: Vec<String> = args.collect();
        let no_startup = rest.first().is_some_and(|a| a == NO_STARTUP);
        if no_startup {
            rest.remove(0);
        }
        Ok(Self {
            target: PathBuf::from(target),
            url,
            no_startup,
            passthrough: rest,
        })
    }

    /// Render back to positional arguments.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![self.target.to_string_lossy().into_owned(), self.url.clone()];
        args.extend(client_args(self.no_startup, &self.passthrough));
        args
    }
}

/// Arguments for a relaunched client: `[noStartup] <args...>`.
pub fn client_args(no_startup: bool, passthrough: &[String]) -> Vec<String> {
    let mut args = Vec::with_capacity(passthrough.len() + 1);
    if no_startup {
        args.push(NO_STARTUP.to_string());
    }
    args.extend(passthrough.iter().cloned());
    args
}

/// Result of handing off to the updater.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandOff {
    /// The updater is running; the caller should exit.
    Spawned,
    /// Extraction was denied; an elevated client was started instead.
    Elevated,
}

/// Extracts and starts the updater helper for the running client.
pub struct SelfUpdater<'a> {
    payload: UpdaterPayload,
    launcher: &'a dyn ProcessLauncher,
    elevation: &'a dyn Elevation,
    updater_prefix: Vec<String>,
    relaunch_prefix: Vec<String>,
}

impl<'a> SelfUpdater<'a> {
    /// Create a self-updater.
    pub fn new(
        payload: UpdaterPayload,
        launcher: &'a dyn ProcessLauncher,
        elevation: &'a dyn Elevation,
    ) -> Self {
        Self {
            payload,
            launcher,
            elevation,
            updater_prefix: Vec::new(),
            relaunch_prefix: Vec::new(),
        }
    }

    /// Arguments placed before the updater's positional arguments
    /// (e.g. the `update` subcommand).
    pub fn with_updater_prefix(mut self, prefix: Vec<String>) -> Self {
        self.updater_prefix = prefix;
        self
    }

    /// Arguments placed before `[noStartup] <args...>` when the client
    /// relaunches itself elevated (e.g. the `sync` subcommand).
    pub fn with_relaunch_prefix(mut self, prefix: Vec<String>) -> Self {
        self.relaunch_prefix = prefix;
        self
    }

    /// Extract the helper and start it for `current_exe`.
    ///
    /// A permission failure restarts the client elevated, unless it already
    /// is elevated, in which case [`BootstrapError::AccessDenied`] is returned.
    pub fn hand_off(
        &self,
        current_exe: &Path,
        patcher_url: &str,
        no_startup: bool,
        passthrough: &[String],
    ) -> BootstrapResult<HandOff> {
        let updater_args = UpdaterArgs {
            target: current_exe.to_path_buf(),
            url: patcher_url.to_string(),
            no_startup,
            passthrough: passthrough.to_vec(),
        };

        match self.start_updater(current_exe, &updater_args) {
            Ok(()) => {
                info!(updater = %self.payload.path().display(), "Updater started");
                Ok(HandOff::Spawned)
            }
            Err(e) if e.is_permission_denied() => {
                self.elevate(current_exe, no_startup, passthrough, e)
            }
            Err(e) => Err(e),
        }
    }

    /// Restart the client elevated after `cause`, or fail if already elevated.
    pub fn elevate(
        &self,
        current_exe: &Path,
        no_startup: bool,
        passthrough: &[String],
        cause: BootstrapError,
    ) -> BootstrapResult<HandOff> {
        if self.elevation.is_elevated() {
            let source = match cause {
                BootstrapError::Extract { source, .. }
                | BootstrapError::Launch { source, .. }
                | BootstrapError::Cleanup { source, .. } => source,
                other => return Err(other),
            };
            return Err(BootstrapError::AccessDenied {
                path: self.payload.path().to_path_buf(),
                source,
            });
        }

        warn!(error = %cause, "Permission denied, restarting elevated");
        let mut args = self.relaunch_prefix.clone();
        args.extend(client_args(no_startup, passthrough));
        self.elevation
            .relaunch_elevated(current_exe, &args)
            .map_err(|source| BootstrapError::Launch {
                program: current_exe.to_path_buf(),
                source,
            })?;
        Ok(HandOff::Elevated)
    }

    fn start_updater(&self, current_exe: &Path, args: &UpdaterArgs) -> BootstrapResult<()> {
        self.payload.extract(current_exe)?;

        let mut argv = self.updater_prefix.clone();
        argv.extend(args.to_args());
        self.launcher
            .spawn(self.payload.path(), &argv)
            .map_err(|source| BootstrapError::Launch {
                program: self.payload.path().to_path_buf(),
                source,
            })
    }
}

/// Replace `args.target` with the binary at `args.url`, then relaunch it.
///
/// The download waits until the exiting client releases its binary.
/// `relaunch_prefix` is placed before `[noStartup] <args...>`.
pub fn run_updater(
    args: &UpdaterArgs,
    client: Client,
    retry: RetryPolicy,
    launcher: &dyn ProcessLauncher,
    relaunch_prefix: &[String],
) -> BootstrapResult<()> {
    info!(target = %args.target.display(), url = %args.url, "Updating client");

    TransferEngine::new(client, args.url.as_str(), &args.target)
        .with_retry(retry)
        .with_poll_interval(RELEASE_POLL)
        .run(&|progress| {
            debug!(
                status = progress.status.name(),
                position = progress.position,
                "Updater progress"
            )
        })?;

    make_executable(&args.target)?;

    let mut argv = relaunch_prefix.to_vec();
    argv.extend(client_args(args.no_startup, &args.passthrough));
    launcher
        .spawn(&args.target, &argv)
        .map_err(|source| BootstrapError::Launch {
            program: args.target.clone(),
            source,
        })?;

    info!(target = %args.target.display(), "Client updated and relaunched");
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> BootstrapResult<()> {
    use std::os::unix::fs::PermissionsExt;

    let map = |source| BootstrapError::Permissions {
        path: path.to_path_buf(),
        source,
    };
    let mut permissions = fs::metadata(path).map_err(map)?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    fs::set_permissions(path, permissions).map_err(map)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> BootstrapResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::launcher::testing::{FakeElevation, RecordingLauncher};
    use tempfile::TempDir;

    #[test]
    fn test_payload_beside_exe() {
        assert_eq!(
            UpdaterPayload::beside(Path::new("/opt/app/patchline")).path(),
            Path::new("/opt/app/patchline-updater")
        );
        assert_eq!(
            UpdaterPayload::beside(Path::new("C/app/patchline.exe")).path(),
            Path::new("C/app/patchline-updater.exe")
        );
    }

    #[test]
    fn test_parse_updater_args() {
        let args =
            UpdaterArgs::parse(["/opt/app/patchline", "http://o/p", "noStartup", "-x", "y"])
                .unwrap();

        assert_eq!(args.target, PathBuf::from("/opt/app/patchline"));
        assert_eq!(args.url, "http://o/p");
        assert!(args.no_startup);
        assert_eq!(args.passthrough, vec!["-x", "y"]);
        assert_eq!(
            args.to_args(),
            vec!["/opt/app/patchline", "http://o/p", "noStartup", "-x", "y"]
        );
    }

    #[test]
    fn test_parse_updater_args_missing() {
        assert!(matches!(
            UpdaterArgs::parse(["only-target"]),
            Err(BootstrapError::MissingArgument("patcher url"))
        ));
        assert!(matches!(
            UpdaterArgs::parse(Vec::<String>::new()),
            Err(BootstrapError::MissingArgument("target executable"))
        ));
    }

    #[test]
    fn test_cleanup_removes_stale_updater() {
        let temp = TempDir::new().unwrap();
        let payload = UpdaterPayload::new(temp.path().join("patchline-updater"));

        assert!(!cleanup_stale_updater(&payload).unwrap());
        fs::write(payload.path(), b"old").unwrap();
        assert!(cleanup_stale_updater(&payload).unwrap());
        assert!(!payload.path().exists());
    }

    #[test]
    fn test_hand_off_spawns_updater_with_positions() {
        let temp = TempDir::new().unwrap();
        let exe = temp.path().join("patchline");
        fs::write(&exe, b"binary").unwrap();
        let payload = UpdaterPayload::beside(&exe);
        let launcher = RecordingLauncher::default();
        let elevation = FakeElevation::default();

        let updater = SelfUpdater::new(payload.clone(), &launcher, &elevation)
            .with_updater_prefix(vec!["update".into()]);
        let result = updater
            .hand_off(&exe, "http://o/p", true, &["a".to_string()])
            .unwrap();

        assert_eq!(result, HandOff::Spawned);
        assert_eq!(fs::read(payload.path()).unwrap(), b"binary");
        let launches = launcher.launches();
        assert_eq!(launches.len(), 1);
        assert_eq!(launches[0].program, payload.path());
        assert_eq!(
            launches[0].args,
            vec![
                "update".to_string(),
                exe.to_string_lossy().into_owned(),
                "http://o/p".to_string(),
                "noStartup".to_string(),
                "a".to_string()
            ]
        );
    }

    #[test]
    fn test_elevate_when_not_elevated() {
        let launcher = RecordingLauncher::default();
        let elevation = FakeElevation::default();
        let updater = SelfUpdater::new(UpdaterPayload::new("/x/u"), &launcher, &elevation)
            .with_relaunch_prefix(vec!["sync".into()]);
        let cause = BootstrapError::Extract {
            path: PathBuf::from("/x/u"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };

        let result = updater
            .elevate(Path::new("/x/patchline"), false, &["arg".to_string()], cause)
            .unwrap();

        assert_eq!(result, HandOff::Elevated);
        assert_eq!(
            *elevation.relaunches.lock(),
            vec![vec!["sync".to_string(), "arg".to_string()]]
        );
    }

    #[test]
    fn test_elevate_when_already_elevated_fails() {
        let launcher = RecordingLauncher::default();
        let elevation = FakeElevation {
            elevated: true,
            ..Default::default()
        };
        let updater = SelfUpdater::new(UpdaterPayload::new("/x/u"), &launcher, &elevation);
        let cause = BootstrapError::Extract {
            path: PathBuf::from("/x/u"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };

        let result = updater.elevate(Path::new("/x/patchline"), false, &[], cause);

        assert!(matches!(result, Err(BootstrapError::AccessDenied { .. })));
        assert!(elevation.relaunches.lock().is_empty());
    }
}
