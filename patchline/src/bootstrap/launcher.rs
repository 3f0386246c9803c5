//! Process launching and privilege elevation.
//!
//! Both concerns sit behind traits so the session logic can be exercised
//! without spawning real processes.

use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, info};

/// Starts external processes.
pub trait ProcessLauncher: Send + Sync {
    /// Start `program` with `args` without waiting for it.
    fn spawn(&self, program: &Path, args: &[String]) -> io::Result<()>;

    /// Start `program` with `args` and wait for it to exit.
    fn run_and_wait(&self, program: &Path, args: &[String]) -> io::Result<()>;
}

/// [`ProcessLauncher`] backed by [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn spawn(&self, program: &Path, args: &[String]) -> io::Result<()> {
        debug!(program = %program.display(), ?args, "Spawning process");
        let mut command = Command::new(program);
        command.args(args).stdin(Stdio::null());
        if let Some(dir) = program.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        command.spawn().map(|_| ())
    }

    fn run_and_wait(&self, program: &Path, args: &[String]) -> io::Result<()> {
        debug!(program = %program.display(), ?args, "Running process");
        let mut command = Command::new(program);
        command.args(args);
        if let Some(dir) = program.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        let status = command.status()?;
        debug!(program = %program.display(), %status, "Process exited");
        Ok(())
    }
}

/// Knows whether the process is privileged and how to restart it elevated.
pub trait Elevation: Send + Sync {
    /// Whether the current process already runs with elevated privileges.
    fn is_elevated(&self) -> bool;

    /// Start a new elevated instance of `program` with `args`.
    fn relaunch_elevated(&self, program: &Path, args: &[String]) -> io::Result<()>;
}

/// Platform elevation: `sudo` on Unix, the `runas` verb on Windows.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemElevation;

impl Elevation for SystemElevation {
    #[cfg(unix)]
    fn is_elevated(&self) -> bool {
        // SAFETY: geteuid has no preconditions and cannot fail.
        unsafe { libc::geteuid() == 0 }
    }

    #[cfg(windows)]
    fn is_elevated(&self) -> bool {
        Command::new("net")
            .arg("session")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[cfg(not(any(unix, windows)))]
    fn is_elevated(&self) -> bool {
        false
    }

    #[cfg(windows)]
    fn relaunch_elevated(&self, program: &Path, args: &[String]) -> io::Result<()> {
        info!(program = %program.display(), "Relaunching as administrator");
        let mut script = format!(
            "Start-Process -FilePath '{}' -Verb RunAs",
            powershell_quote(&program.to_string_lossy())
        );
        if !args.is_empty() {
            let list: Vec<String> = args
                .iter()
                .map(|a| format!("'{}'", powershell_quote(a)))
                .collect();
            script.push_str(" -ArgumentList ");
            script.push_str(&list.join(","));
        }
        Command::new("powershell")
            .args(["-NoProfile", "-NonInteractive", "-Command", &script])
            .spawn()
            .map(|_| ())
    }

    #[cfg(not(windows))]
    fn relaunch_elevated(&self, program: &Path, args: &[String]) -> io::Result<()> {
        info!(program = %program.display(), "Relaunching through sudo");
        Command::new("sudo").arg(program).args(args).spawn().map(|_| ())
    }
}

#[cfg(windows)]
fn powershell_quote(s: &str) -> String {
    s.replace('\'', "''")
}
