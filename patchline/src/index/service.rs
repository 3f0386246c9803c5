//! The content index service.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use notify::{Event, RecommendedWatcher, RecursiveMode};
use parking_lot::{Condvar, Mutex, RwLock};
use reqwest::blocking::Client;
use tracing::{debug, error, info, warn};

use super::action::{apply, IndexAction};
use super::error::{IndexError, IndexResult};
use super::patcher::fetch_patcher_hash;
use super::scan::full_scan;
use super::watcher::{actions_for, watch};
use crate::manifest::{Manifest, PatcherInfo};
use crate::transfer::RetryPolicy;

/// Default quiescence window before a drained queue is published.
pub const DEFAULT_QUIESCENCE: Duration = Duration::from_secs(1);

/// Default timeout for fetching the patcher binary.
pub const DEFAULT_PATCHER_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of rebuild attempts a reload makes before giving up.
pub const DEFAULT_RELOAD_ATTEMPTS: u32 = 10;

/// Settings for a [`ContentIndex`].
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Directory whose files are published.
    pub root: PathBuf,
    /// URL of the published client binary.
    pub patcher_url: String,
    /// Local copy of the client binary to watch for changes, if any.
    pub patcher_file: Option<PathBuf>,
    /// Base URL content files are downloaded from.
    pub content_endpoint: String,
    /// Host application entry point, relative to the install directory.
    pub executable: String,
    /// Patterns of paths clients trust without re-hashing.
    pub verify_exclusion: Vec<String>,
    /// Idle time after which replayed changes are published.
    pub quiescence: Duration,
    /// Timeout for fetching the patcher binary.
    pub patcher_timeout: Duration,
    /// Backoff between failed rebuilds during a reload.
    pub reload_retry: RetryPolicy,
}

impl IndexConfig {
    /// Settings for `root` with everything else defaulted.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            patcher_url: String::new(),
            patcher_file: None,
            content_endpoint: String::new(),
            executable: String::new(),
            verify_exclusion: Vec::new(),
            quiescence: DEFAULT_QUIESCENCE,
            patcher_timeout: DEFAULT_PATCHER_TIMEOUT,
            reload_retry: RetryPolicy::exponential(Some(DEFAULT_RELOAD_ATTEMPTS)),
        }
    }

    /// Set the patcher URL.
    pub fn with_patcher_url(mut self, url: impl Into<String>) -> Self {
        self.patcher_url = url.into();
        self
    }

    /// Watch a local patcher binary.
    pub fn with_patcher_file(mut self, path: Option<PathBuf>) -> Self {
        self.patcher_file = path;
        self
    }

    /// Set the content endpoint.
    pub fn with_content_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.content_endpoint = endpoint.into();
        self
    }

    /// Set the host executable.
    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }

    /// Set the verify-exclusion patterns.
    pub fn with_verify_exclusion(mut self, patterns: Vec<String>) -> Self {
        self.verify_exclusion = patterns;
        self
    }

    /// Set the quiescence window.
    pub fn with_quiescence(mut self, quiescence: Duration) -> Self {
        self.quiescence = quiescence;
        self
    }

    /// Set the backoff used when a reload's rebuild fails.
    pub fn with_reload_retry(mut self, policy: RetryPolicy) -> Self {
        self.reload_retry = policy;
        self
    }

    fn base_manifest(&self) -> Manifest {
        Manifest::new(
            PatcherInfo::new(self.patcher_url.clone()),
            self.content_endpoint.clone(),
        )
        .with_executable(self.executable.clone())
        .with_verify_exclusion(self.verify_exclusion.clone())
    }
}

/// Readiness of the published manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// The initial scan has not finished.
    NotReady,
    /// A consistent manifest is being served.
    Ready,
    /// A reload is rebuilding the manifest from scratch.
    Reloading,
}

impl IndexState {
    /// Get a human-readable name for the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NotReady => "not ready",
            Self::Ready => "ready",
            Self::Reloading => "reloading",
        }
    }
}

struct Published {
    state: IndexState,
    body: Option<Bytes>,
}

#[derive(Default)]
struct ActionQueue {
    actions: VecDeque<IndexAction>,
    replaying: bool,
}

// Lock order: queue, manifest, published.
struct Shared {
    config: IndexConfig,
    root: PathBuf,
    client: Client,
    manifest: Mutex<Manifest>,
    published: RwLock<Published>,
    queue: Mutex<ActionQueue>,
    wake: Condvar,
    generation: AtomicU64,
    watchers: Mutex<Vec<RecommendedWatcher>>,
    reload_lock: Mutex<()>,
}

/// A watched, continuously updated manifest of a content directory.
///
/// Cloning is cheap; clones share the same index.
#[derive(Clone)]
pub struct ContentIndex {
    shared: Arc<Shared>,
}

impl ContentIndex {
    /// Scan `config.root`, install watchers and publish the first manifest.
    ///
    /// Blocks until the initial scan is complete.
    pub fn start(config: IndexConfig) -> IndexResult<Self> {
        let root = fs::canonicalize(&config.root).map_err(|source| IndexError::Root {
            path: config.root.clone(),
            source,
        })?;
        let client = Client::builder()
            .timeout(config.patcher_timeout)
            .build()
            .map_err(IndexError::Client)?;

        info!(root = %root.display(), "Starting content index");

        let shared = Arc::new(Shared {
            manifest: Mutex::new(config.base_manifest()),
            config,
            root,
            client,
            published: RwLock::new(Published {
                state: IndexState::NotReady,
                body: None,
            }),
            queue: Mutex::new(ActionQueue::default()),
            wake: Condvar::new(),
            generation: AtomicU64::new(0),
            watchers: Mutex::new(Vec::new()),
            reload_lock: Mutex::new(()),
        });

        shared.rebuild(0)?;
        Ok(Self { shared })
    }

    /// The published manifest, or `None` while not ready.
    pub fn serve(&self) -> Option<Bytes> {
        let published = self.shared.published.read();
        match published.state {
            IndexState::Ready => published.body.clone(),
            _ => None,
        }
    }

    /// Current readiness.
    pub fn state(&self) -> IndexState {
        self.shared.published.read().state
    }

    /// Canonical content root.
    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    /// Copy of the working manifest, including changes not yet published.
    pub fn snapshot(&self) -> Manifest {
        self.shared.manifest.lock().clone()
    }

    /// Whether no actions are queued or being replayed.
    pub fn is_idle(&self) -> bool {
        let queue = self.shared.queue.lock();
        queue.actions.is_empty() && !queue.replaying
    }

    /// Queue an action for the replay loop.
    pub fn enqueue(&self, action: IndexAction) {
        let generation = self.shared.generation.load(Ordering::SeqCst);
        self.shared.enqueue(generation, action);
    }

    /// Discard all incremental state and rebuild from a fresh scan.
    ///
    /// Serving answers "not ready" until the rebuild completes. A failed
    /// rebuild is retried according to [`IndexConfig::reload_retry`]; once
    /// the policy is exhausted the last error is returned and the index stays
    /// unwatched until the next reload.
    pub fn reload(&self) -> IndexResult<()> {
        self.shared.reload()
    }

    /// Run [`reload`](Self::reload) on a background thread.
    pub fn reload_in_background(&self) {
        self.shared.spawn_reload();
    }
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn reload(self: &Arc<Self>) -> IndexResult<()> {
        let _serial = self.reload_lock.lock();
        info!(root = %self.root.display(), "Reloading content index");

        let generation = {
            let mut queue = self.queue.lock();
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            queue.actions.clear();
            queue.replaying = false;
            self.published.write().state = IndexState::Reloading;
            generation
        };
        self.wake.notify_all();
        self.watchers.lock().clear();

        self.rebuild_with_retry(generation)
    }

    fn rebuild_with_retry(self: &Arc<Self>, generation: u64) -> IndexResult<()> {
        let mut failures = 0u32;
        loop {
            let err = match self.rebuild(generation) {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            self.discard_incremental(generation);
            if !self.is_current(generation) {
                return Ok(());
            }

            failures += 1;
            match self.config.reload_retry.delay_for_attempt(failures) {
                Some(delay) => {
                    warn!(
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Index rebuild failed, retrying"
                    );
                    thread::sleep(delay);
                }
                None => {
                    error!(attempts = failures, error = %err, "Giving up on index rebuild");
                    return Err(err);
                }
            }
        }
    }

    /// Drop the watchers and queued actions of a failed rebuild.
    fn discard_incremental(&self, generation: u64) {
        let watchers = std::mem::take(&mut *self.watchers.lock());
        drop(watchers);

        let mut queue = self.queue.lock();
        if self.is_current(generation) {
            queue.actions.clear();
            queue.replaying = false;
        }
    }

    fn spawn_reload(self: &Arc<Self>) {
        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("patchline-index-reload".to_string())
            .spawn(move || {
                if let Err(e) = shared.reload() {
                    error!(error = %e, "Index reload failed");
                }
            });
        if let Err(e) = spawned {
            error!(error = %e, "Cannot start index reload");
        }
    }

    /// Install watchers, scan, and publish a Ready manifest for `generation`.
    fn rebuild(self: &Arc<Self>, generation: u64) -> IndexResult<()> {
        let watchers = self.install_watchers(generation)?;
        *self.watchers.lock() = watchers;

        let patcher_hash = fetch_patcher_hash(&self.client, &self.config.patcher_url);
        let files = full_scan(&self.root)?;

        let mut queue = self.queue.lock();
        if !self.is_current(generation) {
            debug!(generation, "Rebuild superseded");
            return Ok(());
        }

        {
            let mut manifest = self.manifest.lock();
            manifest.files = files;
            manifest.patcher.hash = patcher_hash;
            let body = manifest.to_bytes()?;
            *self.published.write() = Published {
                state: IndexState::Ready,
                body: Some(body),
            };
        }

        info!(queued = queue.actions.len(), "Content index ready");

        if !queue.actions.is_empty() && !queue.replaying {
            self.start_replay(&mut queue, generation);
        }
        Ok(())
    }

    fn install_watchers(self: &Arc<Self>, generation: u64) -> IndexResult<Vec<RecommendedWatcher>> {
        let mut watchers = Vec::new();

        let weak = Arc::downgrade(self);
        let root = self.root.clone();
        watchers.push(watch(
            &self.root,
            RecursiveMode::Recursive,
            "patchline-index-watch",
            move |res| on_content_event(&weak, generation, &root, res),
        )?);

        if let Some(file) = &self.config.patcher_file {
            if let Some(watcher) = self.watch_patcher(file, generation)? {
                watchers.push(watcher);
            }
        }

        Ok(watchers)
    }

    fn watch_patcher(
        self: &Arc<Self>,
        file: &Path,
        generation: u64,
    ) -> IndexResult<Option<RecommendedWatcher>> {
        let (Some(parent), Some(name)) = (file.parent(), file.file_name()) else {
            warn!(path = %file.display(), "Patcher file has no parent directory");
            return Ok(None);
        };
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        let dir = fs::canonicalize(parent).map_err(|source| IndexError::Root {
            path: parent.to_path_buf(),
            source,
        })?;
        let target = dir.join(name);

        let weak = Arc::downgrade(self);
        let watcher = watch(
            &dir,
            RecursiveMode::NonRecursive,
            "patchline-patcher-watch",
            move |res| {
                let Some(shared) = weak.upgrade() else {
                    return false;
                };
                if !shared.is_current(generation) {
                    return false;
                }
                match res {
                    Ok(event) if event.paths.iter().any(|p| p == &target) => {
                        info!(path = %target.display(), "Patcher changed, refreshing hash");
                        let hash = fetch_patcher_hash(&shared.client, &shared.config.patcher_url);
                        shared.enqueue(generation, IndexAction::SetPatcherHash(hash));
                        true
                    }
                    Ok(_) => true,
                    Err(e) => {
                        warn!(error = %e, "Patcher watcher failed");
                        true
                    }
                }
            },
        )?;
        Ok(Some(watcher))
    }

    fn enqueue(self: &Arc<Self>, generation: u64, action: IndexAction) {
        let mut queue = self.queue.lock();
        if !self.is_current(generation) {
            return;
        }
        debug!(action = ?action, "Queued index action");
        queue.actions.push_back(action);

        if queue.replaying {
            self.wake.notify_one();
        } else if self.published.read().state == IndexState::Ready {
            self.start_replay(&mut queue, generation);
        }
    }

    fn start_replay(self: &Arc<Self>, queue: &mut ActionQueue, generation: u64) {
        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("patchline-index-replay".to_string())
            .spawn(move || shared.replay(generation));
        match spawned {
            Ok(_) => queue.replaying = true,
            Err(e) => error!(error = %e, "Cannot start replay thread"),
        }
    }

    /// Apply queued actions in order; publish once the queue stays empty for
    /// the quiescence window.
    fn replay(&self, generation: u64) {
        let mut applied = 0usize;
        loop {
            let action = {
                let mut queue = self.queue.lock();
                loop {
                    if !self.is_current(generation) {
                        return;
                    }
                    if let Some(action) = queue.actions.pop_front() {
                        break action;
                    }
                    let waited = self.wake.wait_for(&mut queue, self.config.quiescence);
                    if waited.timed_out() && queue.actions.is_empty() {
                        if self.is_current(generation) {
                            self.publish();
                            queue.replaying = false;
                            debug!(applied, "Index refreshed");
                        }
                        return;
                    }
                }
            };

            let mut manifest = self.manifest.lock();
            if !self.is_current(generation) {
                return;
            }
            apply(&mut manifest, &self.root, &action);
            applied += 1;
        }
    }

    fn publish(&self) {
        let manifest = self.manifest.lock();
        match manifest.to_bytes() {
            Ok(body) => {
                let mut published = self.published.write();
                published.state = IndexState::Ready;
                published.body = Some(body);
                info!(files = manifest.files.len(), "Index refreshed");
            }
            Err(e) => error!(error = %e, "Cannot serialize manifest"),
        }
    }
}

fn on_content_event(
    weak: &Weak<Shared>,
    generation: u64,
    root: &Path,
    res: notify::Result<Event>,
) -> bool {
    let Some(shared) = weak.upgrade() else {
        return false;
    };
    if !shared.is_current(generation) {
        return false;
    }

    match res {
        Ok(event) => {
            for action in actions_for(root, &event) {
                shared.enqueue(generation, action);
            }
            true
        }
        Err(e) => {
            warn!(error = %e, "Watcher failed, reloading index");
            shared.spawn_reload();
            false
        }
    }
}
