//! Aggregate progress for a sync session.
//!
//! Workers update atomic counters as bytes arrive; a dedicated sampler
//! thread reads them on a fixed interval and hands a [`SyncProgress`]
//! snapshot to the presentation layer. Workers never call into the UI.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Name of the sampler thread.
pub const REPORTER_THREAD_NAME: &str = "patchline-progress";

/// Default sampling interval (100ms).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A point-in-time view of a sync session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncProgress {
    /// Files fully processed (completed or failed).
    pub items_done: usize,
    /// Files planned.
    pub items_total: usize,
    /// Bytes currently held in temporary or committed files.
    pub bytes_done: u64,
    /// Sum of planned sizes.
    pub bytes_total: u64,
    /// Transfer rate over the last sampling interval, in bytes per second.
    pub bytes_per_sec: f64,
}

impl SyncProgress {
    /// Fraction of planned bytes received, clamped to `0.0..=1.0`.
    pub fn ratio(&self) -> f64 {
        if self.bytes_total == 0 {
            return if self.items_done >= self.items_total { 1.0 } else { 0.0 };
        }
        (self.bytes_done as f64 / self.bytes_total as f64).clamp(0.0, 1.0)
    }
}

/// Callback receiving sampled progress.
pub type ProgressCallback = Box<dyn Fn(&SyncProgress) + Send + Sync>;

/// Shared counters for one coordinator run.
#[derive(Debug)]
pub struct ProgressCounters {
    items_total: usize,
    bytes_total: u64,
    items_done: AtomicUsize,
    bytes_done: AtomicU64,
    done: AtomicBool,
}

impl ProgressCounters {
    /// Create counters for `items_total` files totalling `bytes_total` bytes.
    pub fn new(items_total: usize, bytes_total: u64) -> Self {
        Self {
            items_total,
            bytes_total,
            items_done: AtomicUsize::new(0),
            bytes_done: AtomicU64::new(0),
            done: AtomicBool::new(false),
        }
    }

    /// Record bytes received.
    pub fn add_bytes(&self, bytes: u64) {
        self.bytes_done.fetch_add(bytes, Ordering::SeqCst);
    }

    /// Retract bytes that were discarded by a restarted transfer.
    pub fn remove_bytes(&self, bytes: u64) {
        let _ = self
            .bytes_done
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(v.saturating_sub(bytes))
            });
    }

    /// Record one processed file.
    pub fn complete_item(&self) {
        self.items_done.fetch_add(1, Ordering::SeqCst);
    }

    /// Total bytes recorded so far.
    pub fn bytes_done(&self) -> u64 {
        self.bytes_done.load(Ordering::SeqCst)
    }

    /// Files processed so far.
    pub fn items_done(&self) -> usize {
        self.items_done.load(Ordering::SeqCst)
    }

    /// Signal that the run is over.
    pub fn signal_done(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    /// Whether the run is over.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// Current snapshot with the given rate.
    pub fn snapshot(&self, bytes_per_sec: f64) -> SyncProgress {
        SyncProgress {
            items_done: self.items_done(),
            items_total: self.items_total,
            bytes_done: self.bytes_done(),
            bytes_total: self.bytes_total,
            bytes_per_sec,
        }
    }
}

/// Background sampler that reports progress until stopped or dropped.
pub struct ProgressReporter {
    handle: Option<JoinHandle<()>>,
    counters: Arc<ProgressCounters>,
}

impl ProgressReporter {
    /// Start sampling `counters` every `poll_interval`.
    ///
    /// Fails only if the sampler thread cannot be spawned.
    pub fn start(
        counters: Arc<ProgressCounters>,
        callback: ProgressCallback,
        poll_interval: Duration,
    ) -> io::Result<Self> {
        let sampled = Arc::clone(&counters);

        let handle = thread::Builder::new()
            .name(REPORTER_THREAD_NAME.to_string())
            .spawn(move || {
                let mut last_bytes = sampled.bytes_done();
                let mut last_at = Instant::now();
                let mut rate = 0.0;

                while !sampled.is_done() {
                    thread::sleep(poll_interval);

                    let now = Instant::now();
                    let bytes = sampled.bytes_done();
                    let elapsed = now.duration_since(last_at).as_secs_f64();
                    if elapsed > 0.0 {
                        rate = bytes.saturating_sub(last_bytes) as f64 / elapsed;
                    }
                    last_bytes = bytes;
                    last_at = now;

                    callback(&sampled.snapshot(rate));
                }

                // Final report
                callback(&sampled.snapshot(rate));
            })?;

        Ok(Self {
            handle: Some(handle),
            counters,
        })
    }

    /// Start a reporter with the default 100ms interval.
    pub fn start_default(
        counters: Arc<ProgressCounters>,
        callback: ProgressCallback,
    ) -> io::Result<Self> {
        Self::start(counters, callback, DEFAULT_POLL_INTERVAL)
    }

    /// Stop the reporter and wait for its final report.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.counters.signal_done();
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
