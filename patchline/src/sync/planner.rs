//! The sync planner.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::error::{PlanError, PlanResult};
use super::exclusion::ExclusionRules;
use crate::checksum::{hashes_match, md5_file};
use crate::manifest::{local_path, HashAlgorithm, Manifest};

/// A file scheduled for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDownload {
    /// Manifest path (slash-separated).
    pub path: String,
    /// Size announced by the manifest.
    pub size: u64,
    /// Source URL under the manifest's content endpoint.
    pub url: String,
    /// Local destination.
    pub dest: PathBuf,
}

/// Compute which manifest entries must be downloaded into `root`.
///
/// Entries are visited in manifest order:
///
/// 1. No local file: download.
/// 2. The path matches an exclusion rule and the manifest has a hash: keep.
/// 3. Otherwise hash the local file and download on mismatch. A local file
///    that cannot be hashed, or an entry without a hash, counts as a mismatch.
///
/// An entry whose algorithm is not understood fails the whole plan.
pub fn plan(
    manifest: &Manifest,
    root: &Path,
    rules: &ExclusionRules,
) -> PlanResult<Vec<PendingDownload>> {
    let mut pending = Vec::new();

    for (path, entry) in &manifest.files {
        let dest = local_path(root, path).ok_or_else(|| PlanError::UnsafePath(path.clone()))?;

        let exists = fs::metadata(&dest).map(|m| m.is_file()).unwrap_or(false);
        let needed = if !exists {
            debug!(path = %path, "Missing locally");
            true
        } else if rules.matches(path) && entry.hash.is_some() {
            debug!(path = %path, "Excluded from verification");
            false
        } else {
            match entry.hash_algorithm(path)? {
                HashAlgorithm::Md5 => {
                    let local = md5_file(&dest).ok();
                    let same = matches!(
                        (local.as_deref(), entry.hash.as_deref()),
                        (Some(local), Some(remote)) if hashes_match(local, remote)
                    );
                    if !same {
                        debug!(path = %path, "Content differs");
                    }
                    !same
                }
            }
        };

        if needed {
            pending.push(PendingDownload {
                path: path.clone(),
                size: entry.size,
                url: manifest.content_url(path),
                dest,
            });
        }
    }

    info!(
        files = manifest.files.len(),
        pending = pending.len(),
        bytes = pending.iter().map(|p| p.size).sum::<u64>(),
        "Sync plan computed"
    );

    Ok(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ManifestEntry, ManifestError, PatcherInfo};
    use tempfile::TempDir;

    const HELLO_MD5: &str = "5EB63BBBE01EEED093CB22BB8F5ACDC3";

    fn manifest_with(path: &str, entry: ManifestEntry) -> Manifest {
        let mut manifest = Manifest::new(PatcherInfo::new("http://origin/p"), "http://cdn/c");
        manifest.files.insert(path.to_string(), entry);
        manifest
    }

    #[test]
    fn test_missing_file_is_pending() {
        let temp = TempDir::new().unwrap();
        let manifest = manifest_with("a.txt", ManifestEntry::md5(11, Some(HELLO_MD5.into())));

        let pending = plan(&manifest, temp.path(), &ExclusionRules::none()).unwrap();

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].path, "a.txt");
        assert_eq!(pending[0].size, 11);
        assert_eq!(pending[0].url, "http://cdn/c/a.txt");
        assert_eq!(pending[0].dest, temp.path().join("a.txt"));
    }

    #[test]
    fn test_matching_hash_is_skipped() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), b"hello world").unwrap();
        let manifest = manifest_with(
            "a.txt",
            ManifestEntry::md5(11, Some(HELLO_MD5.to_lowercase())),
        );

        let pending = plan(&manifest, temp.path(), &ExclusionRules::none()).unwrap();
        assert!(pending.is_empty());
    }

    #[test]
    fn test_mismatching_hash_is_pending() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), b"stale").unwrap();
        let manifest = manifest_with("a.txt", ManifestEntry::md5(11, Some(HELLO_MD5.into())));

        let pending = plan(&manifest, temp.path(), &ExclusionRules::none()).unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_excluded_mismatch_with_hash_is_skipped() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("user.ini"), b"local edits").unwrap();
        let manifest = manifest_with("user.ini", ManifestEntry::md5(3, Some(HELLO_MD5.into())));
        let rules = ExclusionRules::compile(&[r".+\.ini$"]).unwrap();

        let pending = plan(&manifest, temp.path(), &rules).unwrap();
        assert!(pending.is_empty());
    }

    #[test]
    fn test_excluded_without_hash_is_verified() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("user.ini"), b"local edits").unwrap();
        let manifest = manifest_with("user.ini", ManifestEntry::md5(3, None));
        let rules = ExclusionRules::compile(&[r".+\.ini$"]).unwrap();

        let pending = plan(&manifest, temp.path(), &rules).unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_unknown_algorithm_fails_plan() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.bin"), b"x").unwrap();
        let manifest = manifest_with(
            "a.bin",
            ManifestEntry {
                size: 1,
                hash: Some("00".into()),
                algorithm: "crc32".into(),
            },
        );

        let result = plan(&manifest, temp.path(), &ExclusionRules::none());
        assert!(matches!(
            result,
            Err(PlanError::Manifest(ManifestError::UnknownAlgorithm { .. }))
        ));
    }

    #[test]
    fn test_escaping_path_fails_plan() {
        let temp = TempDir::new().unwrap();
        let manifest = manifest_with("../outside.bin", ManifestEntry::md5(1, None));

        let result = plan(&manifest, temp.path(), &ExclusionRules::none());
        assert!(matches!(result, Err(PlanError::UnsafePath(p)) if p == "../outside.bin"));
    }

    #[test]
    fn test_nested_paths_resolve_under_root() {
        let temp = TempDir::new().unwrap();
        let manifest = manifest_with("x/y.bin", ManifestEntry::md5(100, None));

        let pending = plan(&manifest, temp.path(), &ExclusionRules::none()).unwrap();
        assert_eq!(pending[0].dest, temp.path().join("x").join("y.bin"));
    }
}
