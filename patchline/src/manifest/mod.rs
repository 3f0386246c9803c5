//! Manifest document model.
//!
//! The manifest is the origin's authoritative description of what content
//! should exist on an installation. It is produced by the content index on
//! the server and consumed as an immutable snapshot by the client for one
//! sync session.
//!
//! # Wire format
//!
//! ```text
//! {
//!   "patcher": { "url": "...", "hash": "9E107D9D...", "alg": "md5" },
//!   "content_endpoint": "https://cdn.example.com/content",
//!   "executable": "bin/app.exe",
//!   "files": {
//!     "bin/app.exe": { "size": 1024, "hash": "...", "alg": "md5" }
//!   },
//!   "verify_exclusion": [".+\\.ini$"]
//! }
//! ```

mod error;

pub use error::{ManifestError, ManifestResult};

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Identifier of the MD5 algorithm on the wire.
pub const ALG_MD5: &str = "md5";

fn default_algorithm() -> String {
    ALG_MD5.to_string()
}

/// Content hash algorithms understood by this implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// MD5, rendered as 32 hex digits.
    Md5,
}

impl HashAlgorithm {
    /// Parse a wire identifier. Returns `None` for anything unrecognized.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            ALG_MD5 => Some(Self::Md5),
            _ => None,
        }
    }

    /// Wire identifier for this algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Md5 => ALG_MD5,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single file in the manifest. The relative path is the key it is
/// stored under in [`Manifest::files`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// File size in bytes.
    pub size: u64,

    /// Hex digest of the file contents, absent when it could not be computed.
    #[serde(default)]
    pub hash: Option<String>,

    /// Algorithm identifier for `hash`.
    #[serde(rename = "alg", default = "default_algorithm")]
    pub algorithm: String,
}

impl ManifestEntry {
    /// Create an MD5 entry.
    pub fn md5(size: u64, hash: Option<String>) -> Self {
        Self {
            size,
            hash,
            algorithm: default_algorithm(),
        }
    }

    /// Resolve the declared algorithm.
    ///
    /// An unknown algorithm is a configuration error on the origin and must
    /// never silently disable verification.
    pub fn hash_algorithm(&self, path: &str) -> ManifestResult<HashAlgorithm> {
        HashAlgorithm::parse(&self.algorithm).ok_or_else(|| ManifestError::UnknownAlgorithm {
            path: path.to_string(),
            algorithm: self.algorithm.clone(),
        })
    }
}

/// Descriptor of the client binary published alongside the content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatcherInfo {
    /// Where the current client binary can be downloaded.
    pub url: String,

    /// Hex digest of that binary; absent when the origin could not fetch it.
    #[serde(default)]
    pub hash: Option<String>,

    /// Algorithm identifier for `hash`.
    #[serde(rename = "alg", default = "default_algorithm")]
    pub algorithm: String,
}

impl PatcherInfo {
    /// Create a patcher descriptor with an unknown hash.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            hash: None,
            algorithm: default_algorithm(),
        }
    }

    /// Set the advertised hash.
    pub fn with_hash(mut self, hash: Option<String>) -> Self {
        self.hash = hash;
        self
    }
}

/// The complete manifest document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Client binary descriptor.
    pub patcher: PatcherInfo,

    /// Base URL that manifest paths are appended to.
    #[serde(alias = "content_end_point")]
    pub content_endpoint: String,

    /// Relative path of the host application to launch after a sync.
    #[serde(default)]
    pub executable: String,

    /// Relative slash-separated path to entry.
    #[serde(default)]
    pub files: BTreeMap<String, ManifestEntry>,

    /// Regular expressions; matching paths that already exist locally skip
    /// hash verification.
    #[serde(default)]
    pub verify_exclusion: Vec<String>,
}

impl Manifest {
    /// Create an empty manifest.
    pub fn new(patcher: PatcherInfo, content_endpoint: impl Into<String>) -> Self {
        Self {
            patcher,
            content_endpoint: content_endpoint.into(),
            executable: String::new(),
            files: BTreeMap::new(),
            verify_exclusion: Vec::new(),
        }
    }

    /// Set the host executable path.
    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }

    /// Set the verification exclusion patterns.
    pub fn with_verify_exclusion(mut self, patterns: Vec<String>) -> Self {
        self.verify_exclusion = patterns;
        self
    }

    /// Parse a manifest from its JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> ManifestResult<Self> {
        serde_json::from_slice(bytes).map_err(ManifestError::Parse)
    }

    /// Serialize the manifest to JSON bytes ready to be served.
    pub fn to_bytes(&self) -> ManifestResult<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(ManifestError::Serialize)
    }

    /// Sum of all entry sizes.
    pub fn total_size(&self) -> u64 {
        self.files.values().map(|e| e.size).sum()
    }

    /// URL a manifest path is downloaded from.
    pub fn content_url(&self, path: &str) -> String {
        join_url(&self.content_endpoint, path)
    }
}

/// Join a base URL and a relative slash-separated path.
///
/// Characters that would otherwise end the path component of a URL are
/// percent-encoded; everything else is left for the HTTP client to encode.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    let mut url = String::with_capacity(base.len() + path.len() + 1);
    url.push_str(base);
    url.push('/');
    for c in path.chars() {
        match c {
            '%' => url.push_str("%25"),
            '#' => url.push_str("%23"),
            '?' => url.push_str("%3F"),
            _ => url.push(c),
        }
    }
    url
}

/// Map a manifest path onto a local directory.
///
/// Returns `None` for paths that would escape `root`: empty components,
/// `.`/`..`, absolute paths or drive prefixes, and backslashes.
pub fn local_path(root: &Path, path: &str) -> Option<PathBuf> {
    let mut local = root.to_path_buf();
    for component in path.split('/') {
        if component.is_empty() || component.contains('\\') {
            return None;
        }
        let mut parts = Path::new(component).components();
        match (parts.next(), parts.next()) {
            (Some(Component::Normal(part)), None) => local.push(part),
            _ => return None,
        }
    }
    Some(local)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "patcher": { "url": "http://origin/patchline", "hash": "ABC", "alg": "md5" },
        "content_endpoint": "http://cdn/content/",
        "executable": "bin/app.exe",
        "files": {
            "bin/app.exe": { "size": 10, "hash": "DEF", "alg": "md5" },
            "data/settings.ini": { "size": 3, "hash": null, "alg": "md5" }
        },
        "verify_exclusion": [".+\\.ini$"]
    }"#;

    #[test]
    fn test_parse_sample_manifest() {
        let manifest = Manifest::from_slice(SAMPLE.as_bytes()).unwrap();

        assert_eq!(manifest.patcher.hash.as_deref(), Some("ABC"));
        assert_eq!(manifest.executable, "bin/app.exe");
        assert_eq!(manifest.files.len(), 2);
        assert_eq!(manifest.files["data/settings.ini"].hash, None);
        assert_eq!(manifest.verify_exclusion, vec![".+\\.ini$".to_string()]);
        assert_eq!(manifest.total_size(), 13);
    }

    #[test]
    fn test_legacy_endpoint_key_is_accepted() {
        let json = r#"{ "patcher": { "url": "u" }, "content_end_point": "http://cdn" }"#;
        let manifest = Manifest::from_slice(json.as_bytes()).unwrap();

        assert_eq!(manifest.content_endpoint, "http://cdn");
        assert_eq!(manifest.patcher.algorithm, ALG_MD5);
        assert!(manifest.files.is_empty());
    }

    #[test]
    fn test_serialized_field_names() {
        let mut manifest = Manifest::new(PatcherInfo::new("u"), "http://cdn");
        manifest
            .files
            .insert("a.txt".to_string(), ManifestEntry::md5(5, Some("H".into())));

        let value: serde_json::Value =
            serde_json::from_slice(&manifest.to_bytes().unwrap()).unwrap();

        assert_eq!(value["patcher"]["alg"], "md5");
        assert!(value["patcher"]["hash"].is_null());
        assert_eq!(value["files"]["a.txt"]["size"], 5);
        assert_eq!(value["files"]["a.txt"]["alg"], "md5");
        assert_eq!(value["content_endpoint"], "http://cdn");
    }

    #[test]
    fn test_unknown_algorithm_is_an_error() {
        let entry = ManifestEntry {
            size: 1,
            hash: Some("x".into()),
            algorithm: "sha1".into(),
        };

        match entry.hash_algorithm("a.bin") {
            Err(ManifestError::UnknownAlgorithm { path, algorithm }) => {
                assert_eq!(path, "a.bin");
                assert_eq!(algorithm, "sha1");
            }
            other => panic!("Expected UnknownAlgorithm, got {:?}", other),
        }
    }

    #[test]
    fn test_content_url_joins_with_single_slash() {
        let manifest = Manifest::new(PatcherInfo::new("u"), "http://cdn/content/");
        assert_eq!(
            manifest.content_url("x/y.bin"),
            "http://cdn/content/x/y.bin"
        );
        assert_eq!(join_url("http://cdn", "/a#b?.txt"), "http://cdn/a%23b%3F.txt");
    }

    #[test]
    fn test_local_path_rejects_escapes() {
        let root = Path::new("/install");

        assert_eq!(
            local_path(root, "x/y.bin"),
            Some(PathBuf::from("/install/x/y.bin"))
        );
        assert_eq!(local_path(root, "../etc/passwd"), None);
        assert_eq!(local_path(root, "a/./b"), None);
        assert_eq!(local_path(root, "/abs"), None);
        assert_eq!(local_path(root, "a//b"), None);
        assert_eq!(local_path(root, "a\\b"), None);
        assert_eq!(local_path(root, ""), None);
    }
}
