//! Progress bars for long-running operations.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::indexing::{PROGRESS_TOTAL, ProgressReporter};

/// Create a styled progress bar on the 0..=100 build scale.
pub fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new(PROGRESS_TOTAL);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .expect("progress bar template is valid")
            .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Create a spinner for indeterminate progress.
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("spinner template is valid")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// A build reporter that drives `bar`.
///
/// `ProgressBar` is a cheap handle, so the caller keeps its own clone to
/// finish the bar once the build returns.
pub fn bar_reporter(bar: ProgressBar) -> ProgressReporter {
    ProgressReporter::new(move |current, total, message| {
        bar.set_length(total);
        bar.set_position(current);
        if let Some(message) = message {
            bar.set_message(message.to_string());
        }
    })
}

/// Helper to display a temporary spinner during an operation.
pub fn with_spinner<F, T>(message: &str, operation: F) -> T
where
    F: FnOnce() -> T,
{
    let spinner = create_spinner(message);
    let result = operation();
    spinner.finish_and_clear();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_reporter_tracks_position() {
        let bar = ProgressBar::hidden();
        let reporter = bar_reporter(bar.clone());
        reporter.report(40, Some("Embedding chunks"));
        reporter.report(30, None);

        assert_eq!(bar.position(), 40);
        assert_eq!(bar.length(), Some(PROGRESS_TOTAL));
        assert_eq!(bar.message(), "Embedding chunks");
    }
}
