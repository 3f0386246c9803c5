//! Patchline - content distribution and self-updating sync client
//!
//! This library keeps a tree of content files on many installations in step
//! with an origin directory:
//!
//! - [`index`] watches the origin directory and keeps a hash-verified
//!   [`manifest`] up to date while files change underneath it.
//! - [`server`] exposes that manifest over HTTP.
//! - [`sync`] plans which files a client must fetch and drains the plan with
//!   a pool of [`transfer`] engines.
//! - [`bootstrap`] replaces the running client binary through a helper
//!   process when the manifest advertises a newer one.
//! - [`client`] ties the client-side pieces into a single sync session.

pub mod bootstrap;
pub mod checksum;
pub mod client;
pub mod config;
pub mod index;
pub mod logging;
pub mod manifest;
pub mod server;
pub mod sync;
pub mod transfer;

/// Library version, as published in Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
