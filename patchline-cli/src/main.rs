//! Patchline CLI - command-line interface
//!
//! - `serve`: index a content directory and publish its manifest.
//! - `sync`: bring an installation in line with a published manifest.
//! - `update`: helper mode started by `sync` to replace the client binary.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::common::ClientOptions;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "patchline")]
#[command(version = patchline::VERSION)]
#[command(about = "Content index server and self-updating sync client", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Index a content directory and serve its manifest over HTTP
    Serve {
        /// Server config file (default: <config dir>/patchline/server.ini)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Content directory to publish
        #[arg(long)]
        content_dir: Option<PathBuf>,
    },

    /// Sync the installation with the content index, then start the host
    Sync {
        #[command(flatten)]
        options: ClientOptions,

        /// Optional `noStartup`, then arguments passed to the host executable
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Replace a client binary and relaunch it (started by `sync`)
    Update {
        #[command(flatten)]
        options: ClientOptions,

        /// <target> <patcher-url> [noStartup] <args...>
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    let verbose = cli.verbose;

    let result: Result<(), CliError> = match cli.command {
        Commands::Serve {
            config,
            port,
            content_dir,
        } => commands::serve::run(commands::serve::ServeArgs {
            config,
            port,
            content_dir,
            verbose,
        }),
        Commands::Sync { options, args } => commands::sync::run(commands::sync::SyncArgs {
            options,
            args,
            verbose,
        }),
        Commands::Update { options, args } => {
            commands::update::run(commands::update::UpdateArgs {
                options,
                args,
                verbose,
            })
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
