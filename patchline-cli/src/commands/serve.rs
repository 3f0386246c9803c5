//! Serve command - publish the manifest of a content directory.

use std::path::PathBuf;

use patchline::config::ServerConfig;
use patchline::index::ContentIndex;
use patchline::server::{serve_listener, ServerError};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::info;

use super::common::{resolve_config_path, start_logging, SERVER_CONFIG};
use crate::error::CliError;

/// Arguments for the serve command.
pub struct ServeArgs {
    pub config: Option<PathBuf>,
    pub port: Option<u16>,
    pub content_dir: Option<PathBuf>,
    pub verbose: bool,
}

/// Run the serve command.
pub fn run(args: ServeArgs) -> Result<(), CliError> {
    let mut config = match resolve_config_path(args.config.as_deref(), SERVER_CONFIG) {
        Some(path) => ServerConfig::load(&path)?,
        None => ServerConfig::default(),
    };
    if let Some(port) = args.port {
        config = config.with_port(port);
    }
    if let Some(dir) = args.content_dir {
        config = config.with_content_dir(dir);
    }

    let _log_guard = start_logging(config.log_file.clone(), args.verbose)?;

    println!("Patchline Index Server v{}", patchline::VERSION);
    println!("=========================");
    println!();
    println!("Content:  {}", config.content_dir.display());
    println!("Listen:   {}", config.listen_addr());
    if !config.patcher_url.is_empty() {
        println!("Patcher:  {}", config.patcher_url);
    }
    println!();
    println!("Indexing content...");

    // The index uses blocking HTTP for the patcher hash, so it starts before the runtime.
    let index = ContentIndex::start(config.index_config())?;
    info!(files = index.snapshot().files.len(), "Index ready");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let mut shutdown_tx = Some(shutdown_tx);
    ctrlc::set_handler(move || {
        if let Some(tx) = shutdown_tx.take() {
            println!();
            println!("Received shutdown signal, stopping server...");
            let _ = tx.send(());
        }
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let addr = config.listen_addr();
    println!("Press Ctrl+C to stop");
    println!();

    runtime.block_on(async move {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        serve_listener(listener, index, async {
            let _ = shutdown_rx.await;
        })
        .await
    })?;

    println!("Server stopped.");
    Ok(())
}
