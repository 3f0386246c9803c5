//! Sync command - bring the installation in line with the content index.

use indicatif::{ProgressBar, ProgressStyle};
use patchline::bootstrap::{SystemElevation, SystemLauncher};
use patchline::client::{HttpManifestSource, SyncOutcome, SyncSession, UserNotifier};
use patchline::sync::{CoordinatorReport, ProgressCallback, SyncProgress};

use super::common::{prefixed, start_logging, ClientOptions};
use crate::error::CliError;

/// Arguments for the sync command.
pub struct SyncArgs {
    pub options: ClientOptions,
    pub args: Vec<String>,
    pub verbose: bool,
}

/// Prints fatal conditions to the terminal.
struct ConsoleNotifier;

impl UserNotifier for ConsoleNotifier {
    fn show_error(&self, title: &str, message: &str) {
        eprintln!();
        eprintln!("{title}");
        eprintln!("{}", "─".repeat(title.chars().count()));
        eprintln!("{message}");
    }
}

/// Run the sync command.
pub fn run(args: SyncArgs) -> Result<(), CliError> {
    let current_exe = std::env::current_exe()
        .map_err(|e| CliError::Config(format!("Cannot locate the running executable: {}", e)))?;
    let config = args.options.load(&current_exe)?;
    let _log_guard = start_logging(config.log_file.clone(), args.verbose)?;

    let relaunch = args.options.relaunch_args(&config);
    let source = HttpManifestSource::new(config.index_url.clone(), config.timeout)?;
    let launcher = SystemLauncher;
    let elevation = SystemElevation;
    let notifier = ConsoleNotifier;

    let session = SyncSession::new(
        config,
        &current_exe,
        &source,
        &launcher,
        &elevation,
        &notifier,
    )
    .with_updater_prefix(prefixed("update", &relaunch))
    .with_relaunch_prefix(prefixed("sync", &relaunch));

    let cancel = session.cancel_flag();
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Cancelling downloads...");
        cancel.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let bar = create_bar();
    let on_progress: ProgressCallback = {
        let bar = bar.clone();
        Box::new(move |progress: &SyncProgress| {
            bar.set_length(progress.bytes_total);
            bar.set_position(progress.bytes_done);
            bar.set_message(format!(
                "[{} / {}] {}/s",
                progress.items_done,
                progress.items_total,
                format_bytes(progress.bytes_per_sec as u64)
            ));
        })
    };

    let outcome = session.run(&args.args, Some(on_progress));
    bar.finish_and_clear();

    match outcome? {
        SyncOutcome::Offline => println!("Content index unreachable, nothing synced."),
        SyncOutcome::SelfUpdateStarted => println!("Client update started."),
        SyncOutcome::ElevationRequested => println!("Restarting with elevated privileges."),
        SyncOutcome::PermissionDenied => println!("Permission denied."),
        SyncOutcome::UpToDate => println!("Up to date."),
        SyncOutcome::Synced(report) => print_report("Sync complete", &report),
        SyncOutcome::Cancelled(report) => print_report("Sync cancelled", &report),
    }
    Ok(())
}

fn create_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
        .map(|s| s.progress_chars("█▓░"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

fn print_report(title: &str, report: &CoordinatorReport) {
    println!("{title}");
    println!(
        "  Files:   {} downloaded ({})",
        report.completed,
        format_bytes(report.bytes)
    );
    if report.remaining > 0 {
        println!("  Pending: {}", report.remaining);
    }
    if !report.failed.is_empty() {
        println!("  Failed:  {}", report.failed.len());
        for failure in &report.failed {
            println!("    {}: {}", failure.path, failure.error);
        }
    }
}

/// Human-readable byte count.
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if bytes < KB {
        format!("{bytes} B")
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
