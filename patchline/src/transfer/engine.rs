//! The resumable transfer engine.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, CONTENT_RANGE, RANGE};
use reqwest::StatusCode;
use tracing::{debug, warn};

use super::cancel::CancelFlag;
use super::error::{TransferError, TransferResult};
use super::lock::wait_until_released;
use super::retry::RetryPolicy;
use super::status::{TransferProgress, TransferStatus};

/// Buffer size for reading/writing during transfers (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Suffix of the in-progress file next to each destination.
const TEMP_SUFFIX: &str = ".temp";

/// How often a busy destination is re-checked.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Build the blocking HTTP client shared by all transfers of a session.
pub fn build_client(timeout: Duration) -> TransferResult<Client> {
    Client::builder()
        .user_agent(concat!("patchline/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
        .map_err(TransferError::Client)
}

/// Path of the temporary file used while downloading `dest`.
pub fn temp_path_for(dest: &Path) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// How a transfer ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The destination now holds the downloaded bytes.
    Completed { bytes: u64 },
    /// The transfer was cancelled and its temporary file removed.
    Cancelled,
}

#[derive(Debug, Default, Clone, Copy)]
struct Cursor {
    position: u64,
    length: Option<u64>,
}

impl Cursor {
    fn is_complete(&self) -> bool {
        self.length.is_some_and(|len| self.position >= len)
    }
}

/// Downloads one URL to one local path, resuming across interruptions.
pub struct TransferEngine {
    client: Client,
    url: String,
    dest: PathBuf,
    temp: PathBuf,
    retry: RetryPolicy,
    cancel: CancelFlag,
    poll_interval: Duration,
}

impl TransferEngine {
    /// Create an engine for `url` → `dest` with the default retry policy.
    pub fn new(client: Client, url: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        let dest = dest.into();
        Self {
            client,
            url: url.into(),
            temp: temp_path_for(&dest),
            dest,
            retry: RetryPolicy::default(),
            cancel: CancelFlag::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the retry policy for transient failures.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Share a cancellation flag with the engine.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Set how often a busy destination is re-checked.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Destination path.
    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Run the transfer to completion, reporting every step to `on_progress`.
    ///
    /// Cancellation is not an error: the temporary file is removed and
    /// [`TransferOutcome::Cancelled`] is returned.
    pub fn run(self, on_progress: &dyn Fn(&TransferProgress)) -> TransferResult<TransferOutcome> {
        debug!(url = %self.url, dest = %self.dest.display(), "Starting transfer");

        match self.execute(on_progress) {
            Ok(bytes) => {
                debug!(url = %self.url, bytes, "Transfer complete");
                Ok(TransferOutcome::Completed { bytes })
            }
            Err(TransferError::Cancelled) => {
                let _ = fs::remove_file(&self.temp);
                debug!(url = %self.url, "Transfer cancelled");
                Ok(TransferOutcome::Cancelled)
            }
            Err(e) => Err(e),
        }
    }

    fn execute(&self, on_progress: &dyn Fn(&TransferProgress)) -> TransferResult<u64> {
        let mut cursor = Cursor::default();

        emit(on_progress, TransferStatus::Initializing, 0, &cursor);
        self.initialize()?;

        emit(on_progress, TransferStatus::Downloading, 0, &cursor);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.temp)
            .map_err(|source| TransferError::Prepare {
                path: self.temp.clone(),
                source,
            })?;

        let mut failures = 0u32;
        while !cursor.is_complete() {
            self.cancel.check()?;
            let before = cursor.position;

            match self.fetch(&mut file, &mut cursor, on_progress) {
                Ok(()) => {}
                Err(e) if e.is_transient() => {
                    if cursor.position > before {
                        failures = 0;
                    }
                    failures += 1;
                    match self.retry.delay_for_attempt(failures) {
                        Some(delay) => {
                            warn!(
                                url = %self.url,
                                position = cursor.position,
                                attempt = failures,
                                error = %e,
                                "Transfer interrupted, resuming after {:?}",
                                delay
                            );
                            self.cancel.sleep(delay)?;
                        }
                        None => {
                            return Err(TransferError::RetriesExhausted {
                                url: self.url.clone(),
                                attempts: failures,
                                last: Box::new(e),
                            })
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }

        file.flush().map_err(|source| TransferError::Write {
            path: self.temp.clone(),
            source,
        })?;
        drop(file);

        emit(on_progress, TransferStatus::Waiting, 0, &cursor);
        wait_until_released(&self.dest, self.poll_interval, &self.cancel)?;

        emit(on_progress, TransferStatus::Finishing, 0, &cursor);
        self.commit()?;

        emit(on_progress, TransferStatus::Finished, 0, &cursor);
        Ok(cursor.position)
    }

    fn initialize(&self) -> TransferResult<()> {
        if let Some(parent) = self.dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| TransferError::Prepare {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        match fs::remove_file(&self.temp) {
            Ok(()) => {
                debug!(path = %self.temp.display(), "Discarded stale partial download");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(TransferError::Prepare {
                path: self.temp.clone(),
                source,
            }),
        }
    }

    /// Issue one request and stream its body into `file`.
    ///
    /// Returns `Ok` when the body ended cleanly or the local state was reset
    /// and a fresh request is needed.
    fn fetch(
        &self,
        file: &mut File,
        cursor: &mut Cursor,
        on_progress: &dyn Fn(&TransferProgress),
    ) -> TransferResult<()> {
        let mut request = self.client.get(&self.url);
        if cursor.position > 0 {
            request = request.header(RANGE, format!("bytes={}-", cursor.position));
        }

        let mut response = request.send().map_err(|source| TransferError::Request {
            url: self.url.clone(),
            source,
        })?;

        let status = response.status();
        if status == StatusCode::PARTIAL_CONTENT {
            let (start, total) = parse_content_range(response.headers()).unwrap_or((0, None));
            let length_changed = matches!((cursor.length, total), (Some(a), Some(b)) if a != b);
            if start != cursor.position || length_changed {
                debug!(url = %self.url, start, "Remote file changed, restarting");
                self.rewind(file, cursor, on_progress)?;
                return Ok(());
            }
            if cursor.length.is_none() {
                cursor.length = total;
            }
        } else if status == StatusCode::RANGE_NOT_SATISFIABLE {
            debug!(url = %self.url, position = cursor.position, "Range rejected, restarting");
            self.rewind(file, cursor, on_progress)?;
            return Ok(());
        } else if status.is_success() {
            if cursor.position > 0 {
                debug!(url = %self.url, "Server ignored range request, restarting");
                self.rewind(file, cursor, on_progress)?;
            }
            cursor.length = response.content_length();
        } else if status.is_client_error()
            && status != StatusCode::REQUEST_TIMEOUT
            && status != StatusCode::TOO_MANY_REQUESTS
        {
            return Err(TransferError::Rejected {
                url: self.url.clone(),
                status,
            });
        } else {
            return Err(TransferError::Status {
                url: self.url.clone(),
                status,
            });
        }

        self.stream(&mut response, file, cursor, on_progress)
    }

    fn stream(
        &self,
        response: &mut Response,
        file: &mut File,
        cursor: &mut Cursor,
        on_progress: &dyn Fn(&TransferProgress),
    ) -> TransferResult<()> {
        let mut buffer = vec![0u8; BUFFER_SIZE];

        loop {
            self.cancel.check()?;

            let n = match response.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(TransferError::Stream {
                        url: self.url.clone(),
                        source,
                    })
                }
            };

            file.write_all(&buffer[..n])
                .map_err(|source| TransferError::Write {
                    path: self.temp.clone(),
                    source,
                })?;

            cursor.position += n as u64;
            emit(on_progress, TransferStatus::Downloading, n as u64, cursor);
        }

        match cursor.length {
            None => {
                cursor.length = Some(cursor.position);
                Ok(())
            }
            Some(expected) if cursor.position < expected => Err(TransferError::ShortBody {
                url: self.url.clone(),
                received: cursor.position,
                expected,
            }),
            Some(_) => Ok(()),
        }
    }

    fn rewind(
        &self,
        file: &mut File,
        cursor: &mut Cursor,
        on_progress: &dyn Fn(&TransferProgress),
    ) -> TransferResult<()> {
        file.set_len(0).map_err(|source| TransferError::Write {
            path: self.temp.clone(),
            source,
        })?;
        cursor.position = 0;
        cursor.length = None;
        emit(on_progress, TransferStatus::Downloading, 0, cursor);
        Ok(())
    }

    fn commit(&self) -> TransferResult<()> {
        match fs::remove_file(&self.dest) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(TransferError::Commit {
                    path: self.dest.clone(),
                    source,
                })
            }
        }

        fs::rename(&self.temp, &self.dest).map_err(|source| TransferError::Commit {
            path: self.dest.clone(),
            source,
        })
    }
}

fn emit(
    on_progress: &dyn Fn(&TransferProgress),
    status: TransferStatus,
    step: u64,
    cursor: &Cursor,
) {
    on_progress(&TransferProgress {
        status,
        step,
        position: cursor.position,
        length: cursor.length,
    });
}

/// Parse `Content-Range: bytes <start>-<end>/<total|*>`.
fn parse_content_range(headers: &HeaderMap) -> Option<(u64, Option<u64>)> {
    let value = headers.get(CONTENT_RANGE)?.to_str().ok()?;
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = rest.split_once('/')?;
    let (start, _end) = range.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    Some((start, total))
}
