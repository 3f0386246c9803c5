//! Where the client gets its manifest from.

use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;

use super::error::{SessionError, SessionResult};
use crate::manifest::Manifest;
use crate::transfer::build_client;

/// Provides the manifest snapshot for one session.
pub trait ManifestSource: Send + Sync {
    /// Location shown in messages.
    fn location(&self) -> &str;

    /// Fetch and parse the current manifest.
    fn fetch(&self) -> SessionResult<Manifest>;
}

/// Fetches the manifest from a content index over HTTP.
#[derive(Debug, Clone)]
pub struct HttpManifestSource {
    client: Client,
    url: String,
}

impl HttpManifestSource {
    /// Create a source for `url` with a per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> SessionResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
        })
    }
}

impl ManifestSource for HttpManifestSource {
    fn location(&self) -> &str {
        &self.url
    }

    fn fetch(&self) -> SessionResult<Manifest> {
        let unreachable = |source| SessionError::Unreachable {
            url: self.url.clone(),
            source,
        };

        let response = self.client.get(&self.url).send().map_err(unreachable)?;
        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().map_err(unreachable)?;
        let manifest = Manifest::from_slice(&body)?;
        debug!(
            url = %self.url,
            files = manifest.files.len(),
            "Fetched manifest"
        );
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_index() {
        let source =
            HttpManifestSource::new("http://127.0.0.1:9/", Duration::from_secs(2)).unwrap();

        assert_eq!(source.location(), "http://127.0.0.1:9/");
        assert!(matches!(
            source.fetch(),
            Err(SessionError::Unreachable { .. })
        ));
    }
}
