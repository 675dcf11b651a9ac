//! Error type system for the RAM cleaner
//!
//! This module provides:
//! - The error taxonomy shared by the trigger, the plugin and the settings store
//! - Classification helpers (type names, fatality)
//! - Error context support for annotating foreign errors

/// Main error type for the RAM cleaner
#[derive(Debug, thiserror::Error)]
pub enum CleanerError {
    // Startup errors
    #[error("Startup resolution failed: {0}")]
    StartupResolutionFailure(String),

    #[error("Initialization failed: {0}")]
    InitializationError(String),

    // Runtime errors contained at the tick boundary
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Action invocation failed: {0}")]
    ActionInvocationError(String),

    #[error("Gate evaluation failed: {0}")]
    GateEvaluationError(String),

    // Plugin lifecycle errors
    #[error("Invalid plugin state: {0}")]
    InvalidState(String),

    // Settings and persistence errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Watch error: {0}")]
    WatchError(String),
}

impl CleanerError {
    /// Get the error type name for log fields
    pub fn error_type(&self) -> &'static str {
        match self {
            CleanerError::StartupResolutionFailure(_) => "StartupResolutionFailure",
            CleanerError::InitializationError(_) => "InitializationError",
            CleanerError::InvalidConfiguration(_) => "InvalidConfiguration",
            CleanerError::ActionInvocationError(_) => "ActionInvocationError",
            CleanerError::GateEvaluationError(_) => "GateEvaluationError",
            CleanerError::InvalidState(_) => "InvalidState",
            CleanerError::ConfigError(_) => "ConfigError",
            CleanerError::IoError(_) => "IoError",
            CleanerError::SerializationError(_) => "SerializationError",
            CleanerError::WatchError(_) => "WatchError",
        }
    }

    /// Whether this error leaves the plugin unable to function
    ///
    /// Everything raised after startup is contained and logged; only failures
    /// to bring the plugin up are fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CleanerError::StartupResolutionFailure(_) | CleanerError::InitializationError(_)
        )
    }
}

impl From<notify::Error> for CleanerError {
    fn from(err: notify::Error) -> Self {
        CleanerError::WatchError(err.to_string())
    }
}

impl From<toml::de::Error> for CleanerError {
    fn from(err: toml::de::Error) -> Self {
        CleanerError::SerializationError(err.to_string())
    }
}

impl From<toml::ser::Error> for CleanerError {
    fn from(err: toml::ser::Error) -> Self {
        CleanerError::SerializationError(err.to_string())
    }
}

/// Result type alias for operations that can fail with CleanerError
pub type Result<T> = std::result::Result<T, CleanerError>;

/// Context extension trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context to an error using a closure
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| CleanerError::ConfigError(format!("{}: {}", context.into(), e)))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| CleanerError::ConfigError(format!("{}: {}", f(), e)))
    }
}
