//! Transfer state machine and progress reports.

/// Stages a transfer moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// Preparing the destination directory and discarding stale partials.
    Initializing,
    /// Streaming the body into the temporary file.
    Downloading,
    /// Waiting for another process to release the destination.
    Waiting,
    /// Replacing the destination with the temporary file.
    Finishing,
    /// Done. The engine is not reused.
    Finished,
}

impl TransferStatus {
    /// Get a human-readable name for the stage.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::Downloading => "Downloading",
            Self::Waiting => "Waiting for file to be released",
            Self::Finishing => "Finishing",
            Self::Finished => "Finished",
        }
    }
}

/// A progress notification emitted by a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    /// Stage at the time of the report.
    pub status: TransferStatus,
    /// Bytes received since the previous report (0 for stage changes).
    pub step: u64,
    /// Bytes currently in the temporary file.
    pub position: u64,
    /// Total length once the server has announced it.
    pub length: Option<u64>,
}

impl TransferProgress {
    /// Fraction complete, if the total length is known.
    pub fn ratio(&self) -> Option<f64> {
        match self.length {
            Some(0) => Some(1.0),
            Some(len) => Some(self.position as f64 / len as f64),
            None => None,
        }
    }
}
