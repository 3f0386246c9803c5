//! Detection of destination files held open by another process.
//!
//! Content files may be loaded by a running host application, and the
//! client binary is still executing while its updater tries to replace it.
//! A file counts as "in use" when opening it for writing fails with the
//! platform's sharing error: a sharing or lock violation on Windows, and
//! `ETXTBSY` (a running executable) on Unix.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use super::cancel::CancelFlag;
use super::error::TransferResult;

/// Whether another process holds `path` in a way that blocks replacing it.
///
/// Missing files and files that fail to open for other reasons are not
/// considered in use; the caller surfaces those errors when it touches them.
pub fn is_file_in_use(path: &Path) -> bool {
    let mut options = OpenOptions::new();
    options.read(true).write(true);

    #[cfg(windows)]
    {
        use std::os::windows::fs::OpenOptionsExt;
        options.share_mode(0);
    }

    match options.open(path) {
        Ok(_) => false,
        Err(e) => is_sharing_violation(&e),
    }
}

#[cfg(windows)]
fn is_sharing_violation(e: &io::Error) -> bool {
    // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
    matches!(e.raw_os_error(), Some(32) | Some(33))
}

#[cfg(not(windows))]
fn is_sharing_violation(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::ETXTBSY)
}

/// Poll until `path` is absent or released, checking for cancellation.
pub fn wait_until_released(
    path: &Path,
    poll_interval: Duration,
    cancel: &CancelFlag,
) -> TransferResult<()> {
    let mut logged = false;
    while path.exists() && is_file_in_use(path) {
        if !logged {
            debug!(path = %path.display(), "Destination in use, waiting");
            logged = true;
        }
        cancel.sleep(poll_interval)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_not_in_use() {
        let temp = TempDir::new().unwrap();
        assert!(!is_file_in_use(&temp.path().join("missing.bin")));
    }

    #[test]
    fn test_plain_file_is_not_in_use() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data.bin");
        fs::write(&path, b"data").unwrap();

        assert!(!is_file_in_use(&path));
    }

    #[test]
    fn test_wait_returns_immediately_for_free_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data.bin");
        fs::write(&path, b"data").unwrap();

        let cancel = CancelFlag::new();
        assert!(wait_until_released(&path, Duration::from_millis(10), &cancel).is_ok());
    }
}
