//! Update command - the helper process that replaces a client binary.
//!
//! Started by `sync` from an extracted copy of the client:
//! `update [options] <target> <patcher-url> [noStartup] <args...>`.

use patchline::bootstrap::{run_updater, BootstrapError, SystemLauncher, UpdaterArgs};
use patchline::transfer::build_client;

use super::common::{prefixed, start_logging, ClientOptions};
use crate::error::CliError;

/// Arguments for the update command.
pub struct UpdateArgs {
    pub options: ClientOptions,
    pub args: Vec<String>,
    pub verbose: bool,
}

/// Run the update command.
pub fn run(args: UpdateArgs) -> Result<(), CliError> {
    let updater_args = UpdaterArgs::parse(args.args)?;
    let config = args.options.load(&updater_args.target)?;
    let _log_guard = start_logging(config.log_file.clone(), args.verbose)?;

    println!("Updating {}...", updater_args.target.display());

    let client = build_client(config.timeout).map_err(BootstrapError::from)?;
    let relaunch = prefixed("sync", &args.options.relaunch_args(&config));
    run_updater(
        &updater_args,
        client,
        config.retry_policy(),
        &SystemLauncher,
        &relaunch,
    )?;

    println!("Update complete.");
    Ok(())
}
