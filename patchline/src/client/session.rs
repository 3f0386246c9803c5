//! The sync session state machine.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use super::error::{SessionError, SessionResult};
use super::notify::{error_chain, UserNotifier};
use super::source::ManifestSource;
use super::state::LocalState;
use crate::bootstrap::{
    check_patcher, cleanup_stale_updater, client_args, BootstrapError, Elevation, HandOff,
    ProcessLauncher, SelfUpdater, UpdaterPayload, NO_STARTUP,
};
use crate::config::ClientConfig;
use crate::manifest::{local_path, Manifest};
use crate::sync::{plan, CoordinatorReport, DownloadCoordinator, ExclusionRules, ProgressCallback};
use crate::transfer::CancelFlag;

/// Name of the throwaway file used to check write access.
const PROBE_FILE: &str = ".patchline-write-probe";

/// How a session ended. Every variant is a normal exit for the process.
#[derive(Debug)]
pub enum SyncOutcome {
    /// The manifest could not be fetched.
    Offline,
    /// The updater helper is running; the client should exit.
    SelfUpdateStarted,
    /// An elevated client was started; this one should exit.
    ElevationRequested,
    /// Access was denied although the client already runs elevated.
    PermissionDenied,
    /// Every file already matched the manifest.
    UpToDate,
    /// Downloads ran to completion. The report lists any failures.
    Synced(CoordinatorReport),
    /// Downloads were cancelled before the queue drained.
    Cancelled(CoordinatorReport),
}

/// Split client arguments into the `noStartup` flag and the pass-through rest.
pub fn split_args(args: &[String]) -> (bool, Vec<String>) {
    match args.split_first() {
        Some((first, rest)) if first == NO_STARTUP => (true, rest.to_vec()),
        _ => (false, args.to_vec()),
    }
}

/// One client run against one manifest snapshot.
pub struct SyncSession<'a> {
    config: ClientConfig,
    current_exe: PathBuf,
    source: &'a dyn ManifestSource,
    launcher: &'a dyn ProcessLauncher,
    elevation: &'a dyn Elevation,
    notifier: &'a dyn UserNotifier,
    updater_prefix: Vec<String>,
    relaunch_prefix: Vec<String>,
    coordinator: DownloadCoordinator,
}

impl<'a> SyncSession<'a> {
    /// Create a session for the client binary at `current_exe`.
    pub fn new(
        config: ClientConfig,
        current_exe: impl Into<PathBuf>,
        source: &'a dyn ManifestSource,
        launcher: &'a dyn ProcessLauncher,
        elevation: &'a dyn Elevation,
        notifier: &'a dyn UserNotifier,
    ) -> Self {
        let coordinator = DownloadCoordinator::new(config.coordinator_config());
        Self {
            config,
            current_exe: current_exe.into(),
            source,
            launcher,
            elevation,
            notifier,
            updater_prefix: Vec::new(),
            relaunch_prefix: Vec::new(),
            coordinator,
        }
    }

    /// Arguments placed before the updater's positional arguments.
    pub fn with_updater_prefix(mut self, prefix: Vec<String>) -> Self {
        self.updater_prefix = prefix;
        self
    }

    /// Arguments placed before `[noStartup] <args...>` on relaunch.
    pub fn with_relaunch_prefix(mut self, prefix: Vec<String>) -> Self {
        self.relaunch_prefix = prefix;
        self
    }

    /// Flag that cancels the download phase.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.coordinator.cancel_flag()
    }

    /// Run the session with the client's command-line arguments.
    pub fn run(
        &self,
        args: &[String],
        on_progress: Option<ProgressCallback>,
    ) -> SessionResult<SyncOutcome> {
        let install_dir = self.config.install_dir.as_path();
        let payload = UpdaterPayload::beside(&self.current_exe);
        if let Err(e) = cleanup_stale_updater(&payload) {
            warn!(error = %e, "Could not remove stale updater");
        }

        let (mut no_startup, passthrough) = split_args(args);
        let state = LocalState::load(install_dir).unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring unreadable local state");
            LocalState::default()
        });
        let known_host = state
            .executable
            .clone()
            .or_else(|| self.config.executable.clone());

        let mut startup_after = false;
        if !no_startup {
            match self.host_path(known_host.as_deref()).filter(|p| p.is_file()) {
                Some(host) => {
                    info!(host = %host.display(), "Running host before sync");
                    if let Err(e) = self.launcher.run_and_wait(&host, &passthrough) {
                        error!(host = %host.display(), error = %e, "Host failed to start");
                    }
                    no_startup = true;
                }
                None => startup_after = true,
            }
        }

        let manifest = match self.source.fetch() {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(url = %self.source.location(), error = %e, "Manifest unavailable");
                if startup_after {
                    self.notifier.show_error(
                        "Network Error",
                        &format!(
                            "Unable to connect to the remote server:\n\n{}",
                            error_chain(&e)
                        ),
                    );
                }
                return Ok(SyncOutcome::Offline);
            }
        };

        if check_patcher(&manifest.patcher, &self.current_exe)?.requires_update() {
            return self.self_update(payload, &manifest, no_startup, &passthrough);
        }

        let rules = ExclusionRules::compile(&manifest.verify_exclusion)?;
        let pending = plan(&manifest, install_dir, &rules)?;
        let host = Some(manifest.executable.as_str())
            .filter(|e| !e.is_empty())
            .and_then(|e| self.host_path(Some(e)))
            .or_else(|| self.host_path(known_host.as_deref()));

        if pending.is_empty() {
            self.save_state(&manifest);
            if startup_after {
                self.start_host(host.as_deref(), &passthrough);
            }
            return Ok(SyncOutcome::UpToDate);
        }

        if let Err(source) = probe_write_access(install_dir) {
            let denied = source.kind() == io::ErrorKind::PermissionDenied;
            let cause = SessionError::Probe {
                path: install_dir.to_path_buf(),
                source,
            };
            if !denied {
                return Err(cause);
            }
            return self.elevate(no_startup, &passthrough, &cause);
        }

        info!(files = pending.len(), "Update required");

        let launcher = self.launcher;
        let after = if startup_after { host } else { None };
        let on_complete = || {
            if let Some(host) = after.as_deref() {
                if let Err(e) = launcher.spawn(host, &passthrough) {
                    error!(host = %host.display(), error = %e, "Host failed to start");
                }
            }
        };

        let report = self.coordinator.run(pending, on_progress, on_complete)?;
        if report.cancelled {
            return Ok(SyncOutcome::Cancelled(report));
        }
        if report.is_success() {
            self.save_state(&manifest);
        }
        Ok(SyncOutcome::Synced(report))
    }

    fn self_update(
        &self,
        payload: UpdaterPayload,
        manifest: &Manifest,
        no_startup: bool,
        passthrough: &[String],
    ) -> SessionResult<SyncOutcome> {
        let updater = SelfUpdater::new(payload, self.launcher, self.elevation)
            .with_updater_prefix(self.updater_prefix.clone())
            .with_relaunch_prefix(self.relaunch_prefix.clone());

        match updater.hand_off(
            &self.current_exe,
            &manifest.patcher.url,
            no_startup,
            passthrough,
        ) {
            Ok(HandOff::Spawned) => Ok(SyncOutcome::SelfUpdateStarted),
            Ok(HandOff::Elevated) => Ok(SyncOutcome::ElevationRequested),
            Err(e @ BootstrapError::AccessDenied { .. }) => {
                self.notifier.show_error(
                    "Permission Error",
                    &format!("Unable to access directory:\n\n{}", error_chain(&e)),
                );
                Ok(SyncOutcome::PermissionDenied)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn elevate(
        &self,
        no_startup: bool,
        passthrough: &[String],
        cause: &SessionError,
    ) -> SessionResult<SyncOutcome> {
        if self.elevation.is_elevated() {
            self.notifier.show_error(
                "Permission Error",
                &format!("Unable to access directory:\n\n{}", error_chain(cause)),
            );
            return Ok(SyncOutcome::PermissionDenied);
        }

        warn!(error = %cause, "Permission denied, restarting elevated");
        let mut args = self.relaunch_prefix.clone();
        args.extend(client_args(no_startup, passthrough));
        self.elevation
            .relaunch_elevated(&self.current_exe, &args)
            .map_err(|source| SessionError::Launch {
                program: self.current_exe.clone(),
                source,
            })?;
        Ok(SyncOutcome::ElevationRequested)
    }

    fn host_path(&self, executable: Option<&str>) -> Option<PathBuf> {
        local_path(&self.config.install_dir, executable?)
    }

    fn start_host(&self, host: Option<&Path>, passthrough: &[String]) {
        let Some(host) = host else {
            warn!("No host executable configured");
            return;
        };
        if let Err(e) = self.launcher.spawn(host, passthrough) {
            error!(host = %host.display(), error = %e, "Host failed to start");
        }
    }

    fn save_state(&self, manifest: &Manifest) {
        if manifest.executable.is_empty() {
            return;
        }
        let state = LocalState {
            executable: Some(manifest.executable.clone()),
        };
        if let Err(e) = state.save(&self.config.install_dir) {
            warn!(error = %e, "Could not save local state");
        }
    }
}

/// Create and delete a throwaway file in `dir`.
fn probe_write_access(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let path = dir.join(PROBE_FILE);
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)?;
    fs::remove_file(&path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::testing::{FakeElevation, RecordingLauncher};
    use crate::client::notify::testing::RecordingNotifier;
    use crate::manifest::{ManifestEntry, PatcherInfo};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const CLIENT_BYTES: &[u8] = b"hello world";
    const CLIENT_MD5: &str = "5EB63BBBE01EEED093CB22BB8F5ACDC3";

    struct StaticSource {
        manifest: Option<Manifest>,
        fetches: AtomicUsize,
    }

    impl StaticSource {
        fn new(manifest: Option<Manifest>) -> Self {
            Self {
                manifest,
                fetches: AtomicUsize::new(0),
            }
        }
    }

    impl ManifestSource for StaticSource {
        fn location(&self) -> &str {
            "test://index"
        }

        fn fetch(&self) -> SessionResult<Manifest> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.manifest.clone().ok_or(SessionError::Status {
                url: self.location().to_string(),
                status: 503,
            })
        }
    }

    struct Fixture {
        temp: TempDir,
        launcher: RecordingLauncher,
        elevation: FakeElevation,
        notifier: RecordingNotifier,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            fs::create_dir_all(temp.path().join("bin")).unwrap();
            fs::create_dir_all(temp.path().join("game")).unwrap();
            fs::write(temp.path().join("bin").join("client"), CLIENT_BYTES).unwrap();
            Self {
                temp,
                launcher: RecordingLauncher::default(),
                elevation: FakeElevation::default(),
                notifier: RecordingNotifier::default(),
            }
        }

        fn exe(&self) -> PathBuf {
            self.temp.path().join("bin").join("client")
        }

        fn install_dir(&self) -> PathBuf {
            self.temp.path().join("game")
        }

        fn config(&self) -> ClientConfig {
            let mut config = ClientConfig::default().with_install_dir(self.install_dir());
            config.executable = Some("app".into());
            config
        }

        fn session<'a>(&'a self, source: &'a StaticSource) -> SyncSession<'a> {
            SyncSession::new(
                self.config(),
                self.exe(),
                source,
                &self.launcher,
                &self.elevation,
                &self.notifier,
            )
            .with_updater_prefix(vec!["update".into()])
            .with_relaunch_prefix(vec!["sync".into()])
        }

        fn write_host(&self) -> PathBuf {
            let host = self.install_dir().join("app");
            fs::write(&host, b"host").unwrap();
            host
        }
    }

    fn manifest(patcher_hash: Option<&str>) -> Manifest {
        Manifest::new(
            PatcherInfo::new("http://origin/client").with_hash(patcher_hash.map(str::to_string)),
            "http://127.0.0.1:9/content",
        )
        .with_executable("app")
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_split_args() {
        assert_eq!(split_args(&args(&["noStartup", "-x"])), (true, args(&["-x"])));
        assert_eq!(split_args(&args(&["-x", "noStartup"])), (false, args(&["-x", "noStartup"])));
        assert_eq!(split_args(&[]), (false, Vec::new()));
    }

    #[test]
    fn test_offline_first_run_notifies() {
        let fx = Fixture::new();
        let source = StaticSource::new(None);

        let outcome = fx.session(&source).run(&[], None).unwrap();

        assert!(matches!(outcome, SyncOutcome::Offline));
        assert_eq!(fx.notifier.titles(), vec!["Network Error"]);
        assert!(fx.launcher.launches().is_empty());
    }

    #[test]
    fn test_offline_after_host_run_is_silent() {
        let fx = Fixture::new();
        let host = fx.write_host();
        let source = StaticSource::new(None);

        let outcome = fx.session(&source).run(&args(&["-x"]), None).unwrap();

        assert!(matches!(outcome, SyncOutcome::Offline));
        assert!(fx.notifier.titles().is_empty());
        let launches = fx.launcher.launches();
        assert_eq!(launches.len(), 1);
        assert_eq!(launches[0].program, host);
        assert_eq!(launches[0].args, args(&["-x"]));
        assert!(launches[0].waited);
    }

    #[test]
    fn test_equal_patcher_hash_spawns_no_updater() {
        let fx = Fixture::new();
        let source = StaticSource::new(Some(manifest(Some(CLIENT_MD5))));

        let outcome = fx.session(&source).run(&args(&["noStartup"]), None).unwrap();

        assert!(matches!(outcome, SyncOutcome::UpToDate));
        assert!(fx.launcher.launches().is_empty());
        assert!(!UpdaterPayload::beside(&fx.exe()).path().exists());
    }

    #[test]
    fn test_stale_client_hands_off_before_downloading() {
        let fx = Fixture::new();
        let mut stale = manifest(Some("00000000000000000000000000000000"));
        stale
            .files
            .insert("data.bin".into(), ManifestEntry::md5(3, Some("ABC".into())));
        let source = StaticSource::new(Some(stale));

        let outcome = fx
            .session(&source)
            .run(&args(&["noStartup", "-x"]), None)
            .unwrap();

        assert!(matches!(outcome, SyncOutcome::SelfUpdateStarted));
        let payload = UpdaterPayload::beside(&fx.exe());
        let launches = fx.launcher.launches();
        assert_eq!(launches.len(), 1);
        assert_eq!(launches[0].program, payload.path());
        assert_eq!(
            launches[0].args,
            vec![
                "update".to_string(),
                fx.exe().to_string_lossy().into_owned(),
                "http://origin/client".to_string(),
                NO_STARTUP.to_string(),
                "-x".to_string(),
            ]
        );
        assert!(!fx.install_dir().join("data.bin").exists());
    }

    #[test]
    fn test_host_run_implies_no_startup_for_updater() {
        let fx = Fixture::new();
        fx.write_host();
        let source = StaticSource::new(Some(manifest(Some("FF"))));

        let outcome = fx.session(&source).run(&[], None).unwrap();

        assert!(matches!(outcome, SyncOutcome::SelfUpdateStarted));
        let launches = fx.launcher.launches();
        assert_eq!(launches.len(), 2);
        assert!(launches[0].waited);
        assert_eq!(launches[1].args.last().map(String::as_str), Some(NO_STARTUP));
    }

    #[test]
    fn test_absent_patcher_hash_keeps_running() {
        let fx = Fixture::new();
        let source = StaticSource::new(Some(manifest(None)));

        let outcome = fx.session(&source).run(&args(&["noStartup"]), None).unwrap();

        assert!(matches!(outcome, SyncOutcome::UpToDate));
        assert!(fx.launcher.launches().is_empty());
    }

    #[test]
    fn test_up_to_date_saves_host_and_starts_it_on_first_run() {
        let fx = Fixture::new();
        let mut published = manifest(None);
        published.executable = "bin/host".into();
        let source = StaticSource::new(Some(published));

        let outcome = fx.session(&source).run(&[], None).unwrap();

        assert!(matches!(outcome, SyncOutcome::UpToDate));
        assert_eq!(
            LocalState::load(&fx.install_dir()).unwrap().executable.as_deref(),
            Some("bin/host")
        );
        let launches = fx.launcher.launches();
        assert_eq!(launches.len(), 1);
        assert_eq!(launches[0].program, fx.install_dir().join("bin").join("host"));
        assert!(!launches[0].waited);
    }

    #[test]
    fn test_cancelled_sync_skips_host_and_state() {
        let fx = Fixture::new();
        let mut pending = manifest(None);
        pending
            .files
            .insert("data.bin".into(), ManifestEntry::md5(3, Some("ABC".into())));
        let source = StaticSource::new(Some(pending));

        let mut config = fx.config();
        config.max_retries = 1;
        let session = SyncSession::new(
            config,
            fx.exe(),
            &source,
            &fx.launcher,
            &fx.elevation,
            &fx.notifier,
        );
        session.cancel_flag().cancel();

        let outcome = session.run(&[], None).unwrap();

        match outcome {
            SyncOutcome::Cancelled(report) => assert_eq!(report.remaining, 1),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(fx.launcher.launches().is_empty());
        assert_eq!(LocalState::load(&fx.install_dir()).unwrap(), LocalState::default());
        assert!(!fx.install_dir().join(PROBE_FILE).exists());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_downloads_are_reported() {
        let fx = Fixture::new();
        let mut pending = manifest(None);
        pending
            .files
            .insert("data.bin".into(), ManifestEntry::md5(3, Some("ABC".into())));
        let source = StaticSource::new(Some(pending));

        let mut config = fx.config();
        config.timeout = std::time::Duration::from_secs(2);
        let config = config.with_max_retries(1);
        let session = SyncSession::new(
            config,
            fx.exe(),
            &source,
            &fx.launcher,
            &fx.elevation,
            &fx.notifier,
        );

        let outcome = session.run(&args(&["noStartup"]), None).unwrap();

        match outcome {
            SyncOutcome::Synced(report) => {
                assert!(!report.is_success());
                assert_eq!(report.failed.len(), 1);
                assert_eq!(report.remaining, 0);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(LocalState::load(&fx.install_dir()).unwrap(), LocalState::default());
    }

    #[test]
    fn test_stale_updater_is_removed() {
        let fx = Fixture::new();
        let payload = UpdaterPayload::beside(&fx.exe());
        fs::write(payload.path(), b"old").unwrap();
        let source = StaticSource::new(None);

        fx.session(&source).run(&args(&["noStartup"]), None).unwrap();

        assert!(!payload.path().exists());
    }

    #[test]
    fn test_probe_write_access() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("new");

        probe_write_access(&dir).unwrap();

        assert!(dir.is_dir());
        assert!(!dir.join(PROBE_FILE).exists());
    }
}
