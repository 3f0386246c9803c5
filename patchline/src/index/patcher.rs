//! Patcher hash refresh.

use reqwest::blocking::Client;
use tracing::{debug, warn};

use crate::checksum::md5_reader;

/// Download the published client binary and return its MD5 digest.
///
/// Any failure is logged and yields `None`, which clients treat as
/// "cannot verify, do not self-update".
pub fn fetch_patcher_hash(client: &Client, url: &str) -> Option<String> {
    if url.is_empty() {
        return None;
    }

    let response = match client.get(url).send() {
        Ok(response) => response,
        Err(e) => {
            warn!(url, error = %e, "Cannot fetch patcher");
            return None;
        }
    };

    if !response.status().is_success() {
        warn!(url, status = %response.status(), "Cannot fetch patcher");
        return None;
    }

    match md5_reader(response) {
        Ok(hash) => {
            debug!(url, hash = %hash, "Patcher hashed");
            Some(hash)
        }
        Err(e) => {
            warn!(url, error = %e, "Patcher download interrupted");
            None
        }
    }
}
