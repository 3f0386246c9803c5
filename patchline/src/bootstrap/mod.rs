//! Self-update bootstrap.
//!
//! Before syncing content, the client compares its own binary against the
//! manifest's `patcher` descriptor ([`check_patcher`]). When they differ it
//! hands off to a helper copy of itself ([`SelfUpdater::hand_off`]) and
//! exits; the helper replaces the client ([`run_updater`]) and starts it
//! again. Permission failures retry once through an elevated relaunch.

mod check;
mod error;
mod launcher;
mod updater;

pub use check::{check_patcher, UpdateDecision};
pub use error::{BootstrapError, BootstrapResult};
pub use launcher::{Elevation, ProcessLauncher, SystemElevation, SystemLauncher};
pub use updater::{
    cleanup_stale_updater, client_args, run_updater, HandOff, SelfUpdater, UpdaterArgs,
    UpdaterPayload, NO_STARTUP,
};

#[cfg(test)]
pub(crate) use launcher::testing;
