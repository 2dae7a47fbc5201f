//! Progress reporting for chunked runs
//!
//! Source files are streamed without a known row count, so progress is shown
//! as a spinner with the running number of households.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Template of the chunk spinner
pub const SPINNER_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {pos} households {msg}";

/// Create a spinner for an operation without a known length
///
/// A hidden spinner is returned when `visible` is false, so callers can
/// update it unconditionally.
#[must_use]
pub fn create_spinner(message: Option<&str>, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template(SPINNER_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    if let Some(msg) = message {
        pb.set_message(msg.to_string());
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Finish a progress bar with an optional completion message
pub fn finish_progress_bar(pb: &ProgressBar, message: Option<&str>) {
    if let Some(msg) = message {
        pb.finish_with_message(msg.to_string());
    } else {
        pb.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_spinner_counts() {
        let pb = create_spinner(Some("scoring"), false);
        pb.inc(10);
        pb.inc(5);
        assert_eq!(pb.position(), 15);
        finish_progress_bar(&pb, None);
        assert!(pb.is_finished());
    }
}
