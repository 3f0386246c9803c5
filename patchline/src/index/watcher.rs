//! Filesystem watchers and notification mapping.

use std::path::Path;
use std::sync::mpsc;
use std::thread;

use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, trace};

use super::action::IndexAction;
use super::error::{IndexError, IndexResult};
use super::scan::relative_key;

/// Install a watcher on `path` and pump its notifications into `handler`.
///
/// The pump thread ends when `handler` returns `false` or when the returned
/// watcher is dropped.
pub(crate) fn watch<F>(
    path: &Path,
    mode: RecursiveMode,
    name: &str,
    mut handler: F,
) -> IndexResult<RecommendedWatcher>
where
    F: FnMut(notify::Result<Event>) -> bool + Send + 'static,
{
    let (tx, rx) = mpsc::channel();

    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    })
    .map_err(|source| IndexError::Watch {
        path: path.to_path_buf(),
        source,
    })?;

    watcher
        .watch(path, mode)
        .map_err(|source| IndexError::Watch {
            path: path.to_path_buf(),
            source,
        })?;

    let watched = path.to_path_buf();
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            while let Ok(res) = rx.recv() {
                if !handler(res) {
                    break;
                }
            }
            debug!(path = %watched.display(), "Watcher pump stopped");
        })
        .map_err(IndexError::Spawn)?;

    Ok(watcher)
}

/// Translate one notification into index actions.
pub(crate) fn actions_for(root: &Path, event: &Event) -> Vec<IndexAction> {
    trace!(kind = ?event.kind, paths = ?event.paths, "Filesystem event");

    let keys = || event.paths.iter().filter_map(|p| relative_key(root, p));

    match &event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            let from = relative_key(root, &event.paths[0]);
            let to = relative_key(root, &event.paths[1]);
            match (from, to) {
                (Some(from), Some(to)) => vec![IndexAction::Rename { from, to }],
                (Some(from), None) => vec![IndexAction::Remove(from)],
                (None, Some(to)) => vec![IndexAction::Refresh(to)],
                (None, None) => Vec::new(),
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) | EventKind::Remove(_) => {
            keys().map(IndexAction::Remove).collect()
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            keys().map(IndexAction::Refresh).collect()
        }
        EventKind::Access(_) => Vec::new(),
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any | EventKind::Other => {
            keys().map(IndexAction::Refresh).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};
    use std::path::PathBuf;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for p in paths {
            event = event.add_path(PathBuf::from(p));
        }
        event
    }

    #[test]
    fn test_create_and_write_refresh() {
        let root = Path::new("/srv/c");

        assert_eq!(
            actions_for(root, &event(EventKind::Create(CreateKind::File), &["/srv/c/a"])),
            vec![IndexAction::Refresh("a".into())]
        );
        assert_eq!(
            actions_for(
                root,
                &event(
                    EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                    &["/srv/c/d/b"]
                )
            ),
            vec![IndexAction::Refresh("d/b".into())]
        );
    }

    #[test]
    fn test_remove_and_rename_halves() {
        let root = Path::new("/srv/c");

        assert_eq!(
            actions_for(root, &event(EventKind::Remove(RemoveKind::Folder), &["/srv/c/d"])),
            vec![IndexAction::Remove("d".into())]
        );
        assert_eq!(
            actions_for(
                root,
                &event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &["/srv/c/x"])
            ),
            vec![IndexAction::Remove("x".into())]
        );
        assert_eq!(
            actions_for(
                root,
                &event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), &["/srv/c/y"])
            ),
            vec![IndexAction::Refresh("y".into())]
        );
    }

    #[test]
    fn test_rename_both() {
        let root = Path::new("/srv/c");
        let rename = EventKind::Modify(ModifyKind::Name(RenameMode::Both));

        assert_eq!(
            actions_for(root, &event(rename, &["/srv/c/old", "/srv/c/new"])),
            vec![IndexAction::Rename {
                from: "old".into(),
                to: "new".into()
            }]
        );
        assert_eq!(
            actions_for(root, &event(rename, &["/elsewhere/f", "/srv/c/f"])),
            vec![IndexAction::Refresh("f".into())]
        );
        assert_eq!(
            actions_for(root, &event(rename, &["/srv/c/f", "/elsewhere/f"])),
            vec![IndexAction::Remove("f".into())]
        );
    }

    #[test]
    fn test_metadata_and_reads_are_ignored() {
        let root = Path::new("/srv/c");

        assert!(actions_for(
            root,
            &event(
                EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
                &["/srv/c/a"]
            )
        )
        .is_empty());
        assert!(actions_for(
            root,
            &event(EventKind::Access(AccessKind::Read), &["/srv/c/a"])
        )
        .is_empty());
    }

    #[test]
    fn test_close_after_write_refreshes() {
        let root = Path::new("/srv/c");
        assert_eq!(
            actions_for(
                root,
                &event(
                    EventKind::Access(AccessKind::Close(AccessMode::Write)),
                    &["/srv/c/a"]
                )
            ),
            vec![IndexAction::Refresh("a".into())]
        );
    }
}
