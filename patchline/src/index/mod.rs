//! Server-side content index.
//!
//! The index owns a content directory and keeps a [`Manifest`] of it
//! consistent while files are created, rewritten, renamed and deleted
//! underneath it.
//!
//! # Architecture
//!
//! ```text
//!   notify watcher ──► pump thread ──► actions_for() ──► enqueue()
//!                                                          │
//!                                       Mutex<VecDeque<IndexAction>>
//!                                                          │
//!                                                          ▼
//!                                replay thread: apply() under manifest lock
//!                                                          │
//!                                queue empty for the quiescence window?
//!                                                          │
//!                                                          ▼
//!                             publish: serialize ──► RwLock<Published>
//!                                                          │
//!                                     serve() clones the Bytes handle
//! ```
//!
//! Readers only ever see a body produced by a full scan or by replaying a
//! prefix of the action queue, never a half-applied action. A watcher
//! failure triggers [`ContentIndex::reload`], which rebuilds from scratch.
//!
//! [`Manifest`]: crate::manifest::Manifest

mod action;
mod error;
mod patcher;
mod scan;
mod service;
mod watcher;

pub use action::{apply, IndexAction};
pub use error::{IndexError, IndexResult};
pub use patcher::fetch_patcher_hash;
pub use scan::{full_scan, is_under, relative_key, FileMap, MAX_SCAN_ATTEMPTS};
pub use service::{
    ContentIndex, IndexConfig, IndexState, DEFAULT_QUIESCENCE, DEFAULT_RELOAD_ATTEMPTS,
};
