//! Plugin module
//!
//! This module provides the plugin-facing surface:
//! - Plugin lifecycle trait and host interfaces
//! - Live settings store with change notifications
//! - Shared game session state
//! - The RAM cleaner plugin itself

pub mod ram_cleaner;
pub mod session;
pub mod settings;
pub mod types;

pub use ram_cleaner::{RamCleanerPlugin, SessionGate};
pub use session::{SessionSnapshot, SharedSessionState};
pub use settings::{descriptors, CleanerSettings, SettingDescriptor, SettingsStore, SettingsWatcher};
pub use types::{
    ConfigSource, Plugin, PluginContext, PluginId, PluginMetadata, PluginState,
    SessionStateProvider, SettingChange, SettingKey, SettingValue,
};
