//! MD5 content hashing for manifest entries and the patcher binary.
//!
//! Digests are rendered as uppercase hex, the form the origin has always
//! published. Comparisons are case-insensitive so manifests written by other
//! tools with lowercase digests verify just the same.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use thiserror::Error;

/// Buffer size for reading files during hashing (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Failure to hash a file.
#[derive(Debug, Error)]
#[error("failed to hash {}: {source}", .path.display())]
pub struct ChecksumError {
    /// File that could not be read.
    pub path: PathBuf,
    /// Underlying I/O error.
    #[source]
    pub source: io::Error,
}

impl ChecksumError {
    /// Whether the file disappeared before or while it was read.
    pub fn is_not_found(&self) -> bool {
        self.source.kind() == io::ErrorKind::NotFound
    }
}

/// Calculate the MD5 digest of everything a reader yields.
pub fn md5_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:X}", hasher.finalize()))
}

/// Calculate the MD5 digest of a file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn md5_file(path: &Path) -> Result<String, ChecksumError> {
    let file = File::open(path).map_err(|e| ChecksumError {
        path: path.to_path_buf(),
        source: e,
    })?;

    md5_reader(file).map_err(|e| ChecksumError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Compare two hex digests ignoring case.
pub fn hashes_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_md5_file() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("test.txt");

        let mut file = File::create(&file_path).unwrap();
        file.write_all(b"hello world").unwrap();

        let checksum = md5_file(&file_path).unwrap();

        // MD5 of "hello world"
        assert_eq!(checksum, "5EB63BBBE01EEED093CB22BB8F5ACDC3");
    }

    #[test]
    fn test_md5_empty_file() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("empty.txt");

        File::create(&file_path).unwrap();

        // MD5 of empty input
        assert_eq!(
            md5_file(&file_path).unwrap(),
            "D41D8CD98F00B204E9800998ECF8427E"
        );
    }

    #[test]
    fn test_md5_nonexistent_file() {
        let err = md5_file(Path::new("/nonexistent/file.txt")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_md5_larger_than_buffer() {
        let data = vec![0xABu8; 100_000];
        let a = md5_reader(&data[..]).unwrap();
        let b = md5_reader(io::Cursor::new(data)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_hashes_match_ignores_case() {
        assert!(hashes_match(
            "5eb63bbbe01eeed093cb22bb8f5acdc3",
            "5EB63BBBE01EEED093CB22BB8F5ACDC3"
        ));
        assert!(!hashes_match("ABC", "ABD"));
    }
}
