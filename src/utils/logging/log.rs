//! Logging helpers
//!
//! Standard messages for file-level operations, so runs over several source
//! files read the same in the log.

use std::path::Path;
use std::time::Duration;

/// Log the start of an operation on a file
pub fn log_operation_start(operation: &str, path: &Path) {
    log::info!("{} {}", operation, path.display());
}

/// Log the completion of an operation on a file
///
/// # Arguments
/// * `operation` - Past-tense description, e.g. "indexed"
/// * `path` - File that was processed
/// * `rows` - Number of rows handled
/// * `elapsed` - Optional elapsed time
pub fn log_operation_complete(
    operation: &str,
    path: &Path,
    rows: usize,
    elapsed: Option<Duration>,
) {
    match elapsed {
        Some(duration) => log::info!(
            "Successfully {operation} {rows} rows from {} in {duration:?}",
            path.display()
        ),
        None => log::info!("Successfully {operation} {rows} rows from {}", path.display()),
    }
}

/// Log a recoverable anomaly, optionally tied to a file
pub fn log_warning(message: &str, path: Option<&Path>) {
    if let Some(path) = path {
        log::warn!("{}: {}", message, path.display());
    } else {
        log::warn!("{message}");
    }
}
