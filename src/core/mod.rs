//! Core runtime module
//!
//! This module provides the runtime services behind the plugin:
//! - The reconfigurable interval trigger
//! - The memory release action and its resolvers
//! - Configuration management
//! - Structured logging system
//! - Error handling and type system

pub mod config;
pub mod error;
pub mod logging;
pub mod release;
pub mod trigger;

pub use config::Config;
pub use error::{CleanerError, ErrorContext, Result};
pub use logging::Logger;
pub use release::{ActionResolver, MallocTrimResolver, StaticResolver};
pub use trigger::{IntervalTrigger, OpenGate, TickGate, TickOutcome, TriggerAction, TriggerStats};
