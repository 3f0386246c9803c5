//! Incremental update actions.
//!
//! Each filesystem notification becomes one [`IndexAction`]. Actions carry
//! only paths; the state they install is read from disk when the action is
//! applied, so replaying a stale or duplicated action is harmless and any
//! sequence of actions converges on what a full scan would produce.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

use super::scan::{index_file, is_under, scan_subtree, FileMap};
use crate::manifest::{local_path, Manifest};

/// One queued change to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexAction {
    /// Reconcile a path with disk: index a file, rescan a directory, or drop
    /// the path (and anything below it) if it no longer exists.
    Refresh(String),
    /// Drop a path and every entry below it.
    Remove(String),
    /// Move an entry, or a directory's entries, to a new prefix.
    Rename { from: String, to: String },
    /// Publish a new patcher hash.
    SetPatcherHash(Option<String>),
}

/// Apply `action` to `manifest`, reading current file state below `root`.
pub fn apply(manifest: &mut Manifest, root: &Path, action: &IndexAction) {
    match action {
        IndexAction::Refresh(key) => refresh(&mut manifest.files, root, key),
        IndexAction::Remove(key) => remove_tree(&mut manifest.files, key),
        IndexAction::Rename { from, to } => rename(&mut manifest.files, root, from, to),
        IndexAction::SetPatcherHash(hash) => {
            debug!(hash = ?hash, "Patcher hash updated");
            manifest.patcher.hash = hash.clone();
        }
    }
}

fn refresh(files: &mut FileMap, root: &Path, key: &str) {
    let Some(path) = local_path(root, key) else {
        debug!(key, "Ignoring unmappable path");
        return;
    };

    match fs::metadata(&path) {
        Ok(meta) if meta.is_dir() => {
            remove_tree(files, key);
            let entries = scan_subtree(root, &path);
            debug!(key, files = entries.len(), "Rescanned directory");
            files.extend(entries);
        }
        Ok(_) => {
            remove_children(files, key);
            match index_file(&path) {
                Some(entry) => {
                    files.insert(key.to_string(), entry);
                }
                None => {
                    files.remove(key);
                }
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => remove_tree(files, key),
        Err(e) => warn!(key, error = %e, "Cannot stat changed path"),
    }
}

fn remove_tree(files: &mut FileMap, key: &str) {
    files.remove(key);
    remove_children(files, key);
}

fn remove_children(files: &mut FileMap, key: &str) {
    files.retain(|k, _| !is_under(k, key));
}

fn rename(files: &mut FileMap, root: &Path, from: &str, to: &str) {
    if from == to || is_under(to, from) {
        refresh(files, root, from);
        refresh(files, root, to);
        return;
    }

    let moved: Vec<String> = files
        .keys()
        .filter(|k| k.as_str() == from || is_under(k, from))
        .cloned()
        .collect();

    if moved.is_empty() {
        let indexed = files.contains_key(to) || files.keys().any(|k| is_under(k, to));
        if !indexed {
            refresh(files, root, to);
        }
        return;
    }

    let entries: Vec<_> = moved
        .into_iter()
        .filter_map(|old| files.remove(&old).map(|entry| (old, entry)))
        .collect();
    remove_tree(files, to);
    for (old, entry) in entries {
        files.insert(format!("{}{}", to, &old[from.len()..]), entry);
    }
}
