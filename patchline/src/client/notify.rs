//! User-facing error notifications.

use std::error::Error;
use std::fmt::Write as _;

use tracing::error;

/// Shows fatal conditions to the person running the client.
pub trait UserNotifier: Send + Sync {
    /// Show an error with a short title.
    fn show_error(&self, title: &str, message: &str);
}

/// [`UserNotifier`] that only writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl UserNotifier for LogNotifier {
    fn show_error(&self, title: &str, message: &str) {
        error!(title, "{message}");
    }
}

/// Render an error and its sources, each cause indented one level deeper.
pub fn error_chain(err: &dyn Error) -> String {
    let mut out = String::new();
    let mut current = Some(err);
    let mut depth = 0;
    while let Some(e) = current {
        let _ = writeln!(out, "{:indent$}{e}", "", indent = depth * 4);
        current = e.source();
        depth += 1;
    }
    out
}

#[cfg(test)]
pub(crate) mod testing {
    use parking_lot::Mutex;

    use super::UserNotifier;

    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        pub shown: Mutex<Vec<(String, String)>>,
    }

    impl RecordingNotifier {
        pub fn titles(&self) -> Vec<String> {
            self.shown.lock().iter().map(|(t, _)| t.clone()).collect()
        }
    }

    impl UserNotifier for RecordingNotifier {
        fn show_error(&self, title: &str, message: &str) {
            self.shown.lock().push((title.to_string(), message.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[derive(Debug, thiserror::Error)]
    #[error("outer")]
    struct Outer(#[source] io::Error);

    #[test]
    fn test_error_chain_indents_sources() {
        let err = Outer(io::Error::new(io::ErrorKind::Other, "inner"));
        assert_eq!(error_chain(&err), "outer\n    inner\n");
    }
}
