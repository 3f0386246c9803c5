//! Error types for the manifest model.

use thiserror::Error;

/// Result type for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;

/// Errors that can occur while reading or writing a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The document is not a valid manifest.
    #[error("failed to parse manifest: {0}")]
    Parse(#[source] serde_json::Error),

    /// The manifest could not be serialized.
    #[error("failed to serialize manifest: {0}")]
    Serialize(#[source] serde_json::Error),

    /// An entry declares a hash algorithm this build does not implement.
    #[error("unknown hash algorithm '{algorithm}' for {path}")]
    UnknownAlgorithm { path: String, algorithm: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_algorithm_display() {
        let err = ManifestError::UnknownAlgorithm {
            path: "a.bin".to_string(),
            algorithm: "crc32".to_string(),
        };
        assert_eq!(err.to_string(), "unknown hash algorithm 'crc32' for a.bin");
    }
}
