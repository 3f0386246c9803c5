//! Client sync session.
//!
//! Ties the client-side mechanisms into the sequence a client runs on
//! every start:
//!
//! ```text
//! cleanup stale updater
//!   → run host (unless noStartup, or first run)
//!   → fetch manifest ──unreachable──► Offline
//!   → self-update check ──stale──► SelfUpdateStarted / ElevationRequested
//!   → plan ──nothing pending──► UpToDate
//!   → write probe ──denied──► ElevationRequested / PermissionDenied
//!   → download coordinator ──► Synced / Cancelled
//!                         └─ last item done: start host (first run only)
//! ```
//!
//! Process launching, elevation, the manifest source and user-facing
//! notifications are injected, so the whole flow runs under test without
//! spawning processes.

mod error;
mod notify;
mod session;
mod source;
mod state;

pub use error::{SessionError, SessionResult};
pub use notify::{error_chain, LogNotifier, UserNotifier};
pub use session::{split_args, SyncOutcome, SyncSession};
pub use source::{HttpManifestSource, ManifestSource};
pub use state::{LocalState, STATE_FILE};
