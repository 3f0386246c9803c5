//! Error types for transfers.

use std::io;
use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Result type for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;

/// Errors that can end or interrupt a transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The request could not be sent or its headers never arrived.
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a status worth retrying (5xx, 408, 429).
    #[error("{url} answered {status}")]
    Status { url: String, status: StatusCode },

    /// The server refused the request in a way retrying will not fix.
    #[error("{url} rejected the request with {status}")]
    Rejected { url: String, status: StatusCode },

    /// Reading the response body failed mid-stream.
    #[error("connection to {url} broke: {source}")]
    Stream {
        url: String,
        #[source]
        source: io::Error,
    },

    /// The body ended before the announced length was reached.
    #[error("{url} closed the body after {received} of {expected} bytes")]
    ShortBody {
        url: String,
        received: u64,
        expected: u64,
    },

    /// The destination directory or temporary file could not be prepared.
    #[error("failed to prepare {}: {source}", .path.display())]
    Prepare {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing to the temporary file failed.
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The finished file could not be moved into place.
    #[error("failed to move {} into place: {source}", .path.display())]
    Commit {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The retry policy ran out of attempts.
    #[error("gave up on {url} after {attempts} attempts: {last}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last: Box<TransferError>,
    },

    /// The transfer was cancelled from another thread.
    #[error("transfer cancelled")]
    Cancelled,
}

impl TransferError {
    /// Whether the failure is a network hiccup that a resumed request may fix.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request { source, .. } => !source.is_builder(),
            Self::Status { .. } | Self::Stream { .. } | Self::ShortBody { .. } => true,
            _ => false,
        }
    }
}
