//! Resumable single-file transfers.
//!
//! A [`TransferEngine`] downloads one URL to one local path. It is used by
//! the download coordinator for content files and by the updater helper for
//! the client binary itself.
//!
//! # Lifecycle
//!
//! ```text
//! Initializing ──► Downloading ──► Waiting ──► Finishing ──► Finished
//!  drop stale        append to       until the     delete old,
//!  <path>.temp       <path>.temp     target is     rename temp
//!                    Range resume    not in use    into place
//! ```
//!
//! Every state transition and every received chunk is reported through the
//! progress callback. Transient network failures are retried according to
//! the engine's [`RetryPolicy`], resuming with `Range: bytes=<position>-`.
//!
//! # Example
//!
//! ```ignore
//! use patchline::transfer::{build_client, TransferEngine};
//!
//! let client = build_client(Duration::from_secs(30))?;
//! let engine = TransferEngine::new(client, "http://cdn/x/y.bin", "install/x/y.bin");
//! engine.run(&|progress| println!("{:?} {}", progress.status, progress.position))?;
//! ```

mod cancel;
mod engine;
mod error;
mod lock;
mod retry;
mod status;

pub use cancel::CancelFlag;
pub use engine::{build_client, temp_path_for, TransferEngine, TransferOutcome};
pub use error::{TransferError, TransferResult};
pub use lock::{is_file_in_use, wait_until_released};
pub use retry::{
    RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_DELAY_SECS,
};
pub use status::{TransferProgress, TransferStatus};
