//! Shared helpers: Arrow column access, logging and synthetic data.

pub mod arrow;
pub mod logging;
pub mod synthetic;

pub use logging::{log_operation_complete, log_operation_start, log_warning};
