//! RAM Cleaner Interval
//!
//! Periodically hands unused heap memory back to the operating system, on an
//! interval that can be switched and retuned while running.

pub mod core;
pub mod plugin;

// Re-export commonly used types
pub use crate::core::{CleanerError, Config, IntervalTrigger};
pub use plugin::{RamCleanerPlugin, SettingsStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
