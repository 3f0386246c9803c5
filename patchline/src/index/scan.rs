//! Full and partial scans of the content tree.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path};

use rayon::prelude::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::error::{IndexError, IndexResult};
use crate::checksum::md5_file;
use crate::manifest::ManifestEntry;

/// Scan attempts before a constantly changing tree is reported as an error.
pub const MAX_SCAN_ATTEMPTS: u32 = 16;

/// Entries of the files mapping, keyed by slash-separated relative path.
pub type FileMap = BTreeMap<String, ManifestEntry>;

/// Slash-separated key of `path` relative to `root`.
///
/// Returns `None` for `root` itself, for paths outside it and for names that
/// are not valid UTF-8.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut key = String::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                if !key.is_empty() {
                    key.push('/');
                }
                key.push_str(part.to_str()?);
            }
            _ => return None,
        }
    }
    (!key.is_empty()).then_some(key)
}

/// Whether `key` lies strictly below directory key `dir`.
pub fn is_under(key: &str, dir: &str) -> bool {
    key.len() > dir.len() && key.starts_with(dir) && key.as_bytes()[dir.len()] == b'/'
}

enum ScanFault {
    /// Something disappeared mid-scan; the whole scan must restart.
    Vanished,
    Fatal(io::Error),
}

/// Build the complete files mapping for `root`.
///
/// Files are hashed in parallel. If any file or directory disappears while
/// the scan runs, the scan restarts from scratch; a file that exists but
/// cannot be hashed is indexed with its size and no hash.
pub fn full_scan(root: &Path) -> IndexResult<FileMap> {
    for attempt in 1..=MAX_SCAN_ATTEMPTS {
        match scan_once(root) {
            Ok(files) => {
                info!(
                    root = %root.display(),
                    files = files.len(),
                    bytes = files.values().map(|e| e.size).sum::<u64>(),
                    "Full scan complete"
                );
                return Ok(files);
            }
            Err(ScanFault::Vanished) => {
                warn!(root = %root.display(), attempt, "Tree changed during scan, restarting");
            }
            Err(ScanFault::Fatal(source)) => {
                return Err(IndexError::Root {
                    path: root.to_path_buf(),
                    source,
                })
            }
        }
    }

    Err(IndexError::Unstable {
        path: root.to_path_buf(),
        attempts: MAX_SCAN_ATTEMPTS,
    })
}

fn scan_once(root: &Path) -> Result<FileMap, ScanFault> {
    let metadata = fs::metadata(root).map_err(ScanFault::Fatal)?;
    if !metadata.is_dir() {
        return Err(ScanFault::Fatal(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a directory",
        )));
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if is_not_found(&e) => return Err(ScanFault::Vanished),
            Err(e) if e.depth() == 0 => {
                return Err(ScanFault::Fatal(
                    e.into_io_error()
                        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "walk failed")),
                ))
            }
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match relative_key(root, entry.path()) {
            Some(key) => found.push((key, entry.into_path())),
            None => debug!(path = %entry.path().display(), "Skipping non UTF-8 path"),
        }
    }

    found
        .into_par_iter()
        .map(|(key, path)| {
            let size = match fs::metadata(&path) {
                Ok(m) => m.len(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(ScanFault::Vanished),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot stat file");
                    0
                }
            };
            let hash = match md5_file(&path) {
                Ok(hash) => Some(hash),
                Err(e) if e.is_not_found() => return Err(ScanFault::Vanished),
                Err(e) => {
                    warn!(error = %e, "Indexing without hash");
                    None
                }
            };
            Ok((key, ManifestEntry::md5(size, hash)))
        })
        .collect()
}

/// Index every file below `dir`, skipping anything that vanishes.
///
/// Used for incremental updates, where a later event reconciles whatever
/// this pass missed.
pub fn scan_subtree(root: &Path, dir: &Path) -> Vec<(String, ManifestEntry)> {
    WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let key = relative_key(root, e.path())?;
            index_file(e.path()).map(|entry| (key, entry))
        })
        .collect()
}

/// Entry for one file, or `None` if it no longer exists.
pub fn index_file(path: &Path) -> Option<ManifestEntry> {
    let size = fs::metadata(path).ok()?.len();
    match md5_file(path) {
        Ok(hash) => Some(ManifestEntry::md5(size, Some(hash))),
        Err(e) if e.is_not_found() => None,
        Err(e) => {
            warn!(error = %e, "Indexing without hash");
            Some(ManifestEntry::md5(size, None))
        }
    }
}

fn is_not_found(e: &walkdir::Error) -> bool {
    e.io_error()
        .is_some_and(|io| io.kind() == io::ErrorKind::NotFound)
}
