//! Patcher hash comparison.

use std::path::Path;

use tracing::{debug, info};

use super::error::BootstrapResult;
use crate::checksum::{hashes_match, md5_file};
use crate::manifest::{HashAlgorithm, PatcherInfo};

/// Whether the running client must be replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateDecision {
    /// The running binary matches the published one.
    UpToDate,
    /// The manifest carries no patcher hash; keep running.
    Unverifiable,
    /// The running binary differs from the published one.
    UpdateRequired {
        /// Hash of the running binary, if the algorithm was understood.
        local: Option<String>,
    },
}

impl UpdateDecision {
    /// Whether a hand-off to the updater is needed.
    pub fn requires_update(&self) -> bool {
        matches!(self, Self::UpdateRequired { .. })
    }
}

/// Compare `current_exe` against the manifest's patcher descriptor.
///
/// An algorithm this client does not understand always requires an update:
/// the published client presumably does understand it.
pub fn check_patcher(patcher: &PatcherInfo, current_exe: &Path) -> BootstrapResult<UpdateDecision> {
    let Some(expected) = patcher.hash.as_deref() else {
        debug!("Manifest has no patcher hash, skipping self-update");
        return Ok(UpdateDecision::Unverifiable);
    };

    let Some(HashAlgorithm::Md5) = HashAlgorithm::parse(&patcher.algorithm) else {
        info!(algorithm = %patcher.algorithm, "Unknown patcher algorithm, updating client");
        return Ok(UpdateDecision::UpdateRequired { local: None });
    };

    let local = md5_file(current_exe)?;
    if hashes_match(&local, expected) {
        debug!(hash = %local, "Client is up to date");
        Ok(UpdateDecision::UpToDate)
    } else {
        info!(local = %local, remote = %expected, "Client binary is outdated");
        Ok(UpdateDecision::UpdateRequired { local: Some(local) })
    }
}
