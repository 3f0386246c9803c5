//! Client-side synchronization: planning and parallel download.
//!
//! # Flow
//!
//! ```text
//!   Manifest ──► ExclusionRules::compile ──► plan() ──► Vec<PendingDownload>
//!                                                            │
//!                                                            ▼
//!                         DownloadCoordinator::run (W worker threads)
//!                            │ shared FIFO queue, one TransferEngine per item
//!                            ▼
//!                         ProgressCounters ──► ProgressReporter (100ms sampler)
//! ```
//!
//! Planning is a pure function of the manifest and the local tree: files
//! that are missing or whose content hash differs are scheduled, and files
//! matching a verify-exclusion pattern are trusted once present.

mod coordinator;
mod error;
mod exclusion;
mod planner;
mod progress;

pub use coordinator::{
    CoordinatorConfig, CoordinatorReport, DownloadCoordinator, FailedDownload, DEFAULT_TIMEOUT,
    DEFAULT_WORKERS,
};
pub use error::{CoordinatorError, CoordinatorResult, PlanError, PlanResult};
pub use exclusion::ExclusionRules;
pub use planner::{plan, PendingDownload};
pub use progress::{ProgressCallback, ProgressCounters, ProgressReporter, SyncProgress};
