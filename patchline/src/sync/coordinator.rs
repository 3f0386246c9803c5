//! Parallel download coordinator.
//!
//! A fixed pool of worker threads drains a shared FIFO queue of
//! [`PendingDownload`]s. Each worker runs one [`TransferEngine`] at a time.
//!
//! ```text
//!            ┌──────────────── queue (Mutex<VecDeque>) ───────────────┐
//!            │  a.pak   b.pak   c.pak   ...                           │
//!            └────┬────────┬────────┬──────────────────────────────────┘
//!                 ▼        ▼        ▼
//!             worker 0  worker 1  worker W-1    (TransferEngine each)
//!                 │        │        │
//!                 └── remaining.fetch_sub(1) ──► == 1 ? on_complete()
//! ```
//!
//! The remaining counter starts at the number of planned items and is
//! decremented once per finished or failed item, so exactly one worker
//! observes the transition to zero. Cancelled items are never counted.

use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::blocking::Client;
use tracing::{debug, error, info};

use super::error::{CoordinatorError, CoordinatorResult};
use super::planner::PendingDownload;
use super::progress::{ProgressCallback, ProgressCounters, ProgressReporter};
use crate::transfer::{
    build_client, CancelFlag, RetryPolicy, TransferEngine, TransferError, TransferOutcome,
};

/// Default number of concurrent downloads.
pub const DEFAULT_WORKERS: usize = 10;

/// Default HTTP timeout per request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a [`DownloadCoordinator`].
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Number of worker threads (minimum 1).
    pub workers: usize,
    /// HTTP connect/request timeout.
    pub timeout: Duration,
    /// Retry policy applied to every transfer.
    pub retry: RetryPolicy,
    /// Poll interval while a destination is held open.
    pub lock_poll_interval: Duration,
    /// Progress sampling interval.
    pub progress_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            lock_poll_interval: Duration::from_secs(1),
            progress_interval: super::progress::DEFAULT_POLL_INTERVAL,
        }
    }
}

impl CoordinatorConfig {
    /// Set the number of workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the HTTP timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the busy-destination poll interval.
    pub fn with_lock_poll_interval(mut self, interval: Duration) -> Self {
        self.lock_poll_interval = interval;
        self
    }

    /// Set the progress sampling interval.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }
}

/// A file that could not be downloaded.
#[derive(Debug)]
pub struct FailedDownload {
    /// Manifest path.
    pub path: String,
    /// Why the transfer ended.
    pub error: TransferError,
}

/// Summary of one coordinator run.
#[derive(Debug, Default)]
pub struct CoordinatorReport {
    /// Files committed to disk.
    pub completed: usize,
    /// Files whose transfer failed.
    pub failed: Vec<FailedDownload>,
    /// Bytes committed across completed files.
    pub bytes: u64,
    /// Items never finished (non-zero only after cancellation).
    pub remaining: usize,
    /// Whether the run was cancelled.
    pub cancelled: bool,
}

impl CoordinatorReport {
    /// Whether every planned file was committed.
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failed.is_empty() && self.remaining == 0
    }
}

/// Runs planned downloads on a fixed pool of worker threads.
pub struct DownloadCoordinator {
    config: CoordinatorConfig,
    queue: Mutex<VecDeque<PendingDownload>>,
    cancel: CancelFlag,
}

impl DownloadCoordinator {
    /// Create a coordinator.
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            queue: Mutex::new(VecDeque::new()),
            cancel: CancelFlag::new(),
        }
    }

    /// Flag shared with every transfer; cancelling it stops the run.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Cancel the run: set the flag and drop queued items.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.queue.lock().clear();
    }

    /// Download every item, blocking until the queue is drained or cancelled.
    ///
    /// `on_complete` runs exactly once, on the worker that finishes the last
    /// item, and never when the run is cancelled first.
    pub fn run<F>(
        &self,
        pending: Vec<PendingDownload>,
        on_progress: Option<ProgressCallback>,
        on_complete: F,
    ) -> CoordinatorResult<CoordinatorReport>
    where
        F: Fn() + Sync,
    {
        let items = pending.len();
        let bytes_total: u64 = pending.iter().map(|p| p.size).sum();
        let client = build_client(self.config.timeout)?;
        let workers = self.config.workers.max(1).min(items.max(1));

        info!(items, bytes = bytes_total, workers, "Starting downloads");

        *self.queue.lock() = pending.into();
        let remaining = AtomicUsize::new(items);
        let completed = AtomicUsize::new(0);
        let committed = Mutex::new(0u64);
        let failed = Mutex::new(Vec::new());
        let counters = Arc::new(ProgressCounters::new(items, bytes_total));

        let reporter = on_progress
            .map(|callback| {
                ProgressReporter::start(
                    Arc::clone(&counters),
                    callback,
                    self.config.progress_interval,
                )
            })
            .transpose()
            .map_err(CoordinatorError::Spawn)?;

        if items == 0 {
            on_complete();
        }

        let spawned: CoordinatorResult<()> = thread::scope(|scope| {
            for id in 0..workers {
                let worker = Worker {
                    id,
                    client: client.clone(),
                    coordinator: self,
                    counters: &counters,
                    remaining: &remaining,
                    completed: &completed,
                    committed: &committed,
                    failed: &failed,
                    on_complete: &on_complete,
                };
                if let Err(e) = thread::Builder::new()
                    .name(format!("patchline-download-{id}"))
                    .spawn_scoped(scope, move || worker.run())
                {
                    self.cancel();
                    return Err(CoordinatorError::Spawn(e));
                }
            }
            Ok(())
        });

        if let Some(reporter) = reporter {
            reporter.stop();
        }
        spawned?;

        let report = CoordinatorReport {
            completed: completed.load(Ordering::SeqCst),
            failed: failed.into_inner(),
            bytes: committed.into_inner(),
            remaining: remaining.load(Ordering::SeqCst),
            cancelled: self.cancel.is_cancelled(),
        };

        info!(
            completed = report.completed,
            failed = report.failed.len(),
            remaining = report.remaining,
            cancelled = report.cancelled,
            "Downloads finished"
        );

        Ok(report)
    }
}

struct Worker<'a, F> {
    id: usize,
    client: Client,
    coordinator: &'a DownloadCoordinator,
    counters: &'a ProgressCounters,
    remaining: &'a AtomicUsize,
    completed: &'a AtomicUsize,
    committed: &'a Mutex<u64>,
    failed: &'a Mutex<Vec<FailedDownload>>,
    on_complete: &'a F,
}

impl<F: Fn() + Sync> Worker<'_, F> {
    fn run(self) {
        let cancel = &self.coordinator.cancel;
        let config = &self.coordinator.config;

        loop {
            if cancel.is_cancelled() {
                self.coordinator.queue.lock().clear();
                break;
            }
            let Some(item) = self.coordinator.queue.lock().pop_front() else {
                break;
            };

            debug!(worker = self.id, path = %item.path, "Downloading");

            let reported = Cell::new(0u64);
            let engine = TransferEngine::new(self.client.clone(), item.url.as_str(), &item.dest)
                .with_retry(config.retry.clone())
                .with_cancel(cancel.clone())
                .with_poll_interval(config.lock_poll_interval);

            let result = engine.run(&|progress| {
                let previous = reported.get();
                if progress.position >= previous {
                    self.counters.add_bytes(progress.position - previous);
                } else {
                    self.counters.remove_bytes(previous - progress.position);
                }
                reported.set(progress.position);
            });

            match result {
                Ok(TransferOutcome::Completed { bytes }) => {
                    self.completed.fetch_add(1, Ordering::SeqCst);
                    *self.committed.lock() += bytes;
                }
                Ok(TransferOutcome::Cancelled) => {
                    self.counters.remove_bytes(reported.get());
                    break;
                }
                Err(e) => {
                    error!(path = %item.path, error = %e, "Download failed");
                    self.counters.remove_bytes(reported.get());
                    self.failed.lock().push(FailedDownload {
                        path: item.path.clone(),
                        error: e,
                    });
                }
            }

            self.counters.complete_item();
            if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                debug!(worker = self.id, "Last download finished");
                (self.on_complete)();
            }
        }
    }
}
