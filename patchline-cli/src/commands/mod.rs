//! CLI command implementations.

pub mod common;
pub mod serve;
pub mod sync;
pub mod update;
