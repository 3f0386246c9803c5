//! Shared fixtures for integration tests.
//!
//! - [`ContentServer`]: a minimal HTTP/1.1 file server with `Range` support
//!   and optional one-shot truncated or stalled responses.
//! - [`spawn_index_server`]: the real axum router on a loopback port.
//! - Process doubles that never start anything.

#![allow(dead_code)]

use std::collections::HashSet;
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use patchline::bootstrap::{Elevation, ProcessLauncher};
use patchline::index::ContentIndex;

// ============================================================================
// Content server
// ============================================================================

/// A request seen by the content server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRequest {
    pub path: String,
    pub range_start: Option<u64>,
}

#[derive(Default)]
struct ServerState {
    seen: Vec<SeenRequest>,
    truncate_once: HashSet<String>,
    stall_once: HashSet<String>,
}

/// How long a stalled response holds the connection open.
pub const STALL: Duration = Duration::from_secs(5);

/// Serves files below a directory on a loopback port.
pub struct ContentServer {
    addr: SocketAddr,
    state: Arc<Mutex<ServerState>>,
}

impl ContentServer {
    /// Start serving `root`. The accept thread lives until the test exits.
    pub fn start(root: &Path) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(ServerState::default()));
        let root = root.to_path_buf();

        let accept_state = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let root = root.clone();
                let state = Arc::clone(&accept_state);
                thread::spawn(move || {
                    let _ = handle(stream, &root, &state);
                });
            }
        });

        Self { addr, state }
    }

    /// Base URL of the server, without a trailing slash.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// URL of a file below the root.
    pub fn file_url(&self, path: &str) -> String {
        format!("{}/{}", self.url(), path)
    }

    /// Cut the next response for `path` off halfway through the body.
    pub fn truncate_next(&self, path: &str) {
        self.state
            .lock()
            .unwrap()
            .truncate_once
            .insert(path.to_string());
    }

    /// Send half of the next response for `path`, then go silent for
    /// [`STALL`] without closing the connection.
    pub fn stall_next(&self, path: &str) {
        self.state
            .lock()
            .unwrap()
            .stall_once
            .insert(path.to_string());
    }

    /// Requests served so far.
    pub fn requests(&self) -> Vec<SeenRequest> {
        self.state.lock().unwrap().seen.clone()
    }

    /// Requests served so far for `path`.
    pub fn requests_for(&self, path: &str) -> Vec<SeenRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

fn handle(stream: TcpStream, root: &Path, state: &Mutex<ServerState>) -> io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;

    let mut range_start = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                range_start = value
                    .trim()
                    .strip_prefix("bytes=")
                    .and_then(|v| v.strip_suffix('-'))
                    .and_then(|v| v.parse::<u64>().ok());
            }
        }
    }

    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .trim_start_matches('/')
        .to_string();

    let (truncate, stall) = {
        let mut state = state.lock().unwrap();
        state.seen.push(SeenRequest {
            path: path.clone(),
            range_start,
        });
        (
            state.truncate_once.remove(&path),
            state.stall_once.remove(&path),
        )
    };

    let mut stream = stream;
    let body = match fs::read(root.join(&path)) {
        Ok(body) if !path.is_empty() => body,
        _ => {
            return write_head(&mut stream, "404 Not Found", &[("Content-Length", "0".into())]);
        }
    };
    let len = body.len() as u64;

    let (status, headers, payload) = match range_start {
        Some(start) if start < len => (
            "206 Partial Content",
            vec![
                ("Content-Length", (len - start).to_string()),
                ("Content-Range", format!("bytes {}-{}/{}", start, len - 1, len)),
            ],
            &body[start as usize..],
        ),
        Some(_) => (
            "416 Range Not Satisfiable",
            vec![
                ("Content-Length", "0".to_string()),
                ("Content-Range", format!("bytes */{}", len)),
            ],
            &body[..0],
        ),
        None => (
            "200 OK",
            vec![("Content-Length", len.to_string())],
            &body[..],
        ),
    };

    write_head(&mut stream, status, &headers)?;
    if truncate {
        stream.write_all(&payload[..payload.len() / 2])?;
        stream.flush()?;
        return stream.shutdown(std::net::Shutdown::Both);
    }
    if stall {
        stream.write_all(&payload[..payload.len() / 2])?;
        stream.flush()?;
        thread::sleep(STALL);
        return Ok(());
    }
    stream.write_all(payload)?;
    stream.flush()
}

fn write_head(stream: &mut TcpStream, status: &str, headers: &[(&str, String)]) -> io::Result<()> {
    let mut head = format!("HTTP/1.1 {}\r\nConnection: close\r\n", status);
    for (name, value) in headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str("\r\n");
    stream.write_all(head.as_bytes())
}

// ============================================================================
// Index server
// ============================================================================

/// Serve `index` with the real router on a loopback port.
pub fn spawn_index_server(index: ContentIndex) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            patchline::server::serve_listener(listener, index, std::future::pending())
                .await
                .unwrap();
        });
    });

    addr
}

// ============================================================================
// Process doubles
// ============================================================================

/// Records launches without starting anything.
#[derive(Default)]
pub struct NullLauncher {
    pub launched: Mutex<Vec<PathBuf>>,
}

impl ProcessLauncher for NullLauncher {
    fn spawn(&self, program: &Path, _args: &[String]) -> io::Result<()> {
        self.launched.lock().unwrap().push(program.to_path_buf());
        Ok(())
    }

    fn run_and_wait(&self, program: &Path, _args: &[String]) -> io::Result<()> {
        self.launched.lock().unwrap().push(program.to_path_buf());
        Ok(())
    }
}

/// Never elevated, never relaunches.
pub struct NoElevation;

impl Elevation for NoElevation {
    fn is_elevated(&self) -> bool {
        false
    }

    fn relaunch_elevated(&self, _program: &Path, _args: &[String]) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Deterministic test content of `len` bytes.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

/// Poll `condition` for up to ten seconds.
pub fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    false
}
