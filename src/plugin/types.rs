//! Plugin type definitions
//!
//! This module defines the plugin lifecycle interface and the narrow host
//! interfaces the plugin is driven through: live settings, game session state
//! and release-action resolution.

use crate::core::error::{CleanerError, Result};
use crate::core::release::ActionResolver;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Unique identifier for a plugin instance
pub type PluginId = String;

/// Unique identifier for a settings subscription
pub type SubscriptionId = String;

/// Base plugin trait
///
/// The host calls `initialize` once after loading the plugin and `shutdown`
/// before unloading it.
#[async_trait::async_trait]
pub trait Plugin: Send + Sync {
    /// Get plugin metadata
    fn metadata(&self) -> &PluginMetadata;

    /// Current lifecycle state
    fn state(&self) -> PluginState;

    /// Initialize the plugin with the given context
    async fn initialize(&self, context: &PluginContext) -> Result<()>;

    /// Shutdown the plugin and release its timer
    async fn shutdown(&self) -> Result<()>;
}

/// Plugin metadata, as registered with the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Reverse-domain identifier (e.g. `com.example.ramcleanerinterval`)
    pub guid: String,

    /// Display name
    pub name: String,

    /// Plugin version (semantic versioning)
    pub version: String,

    /// Plugin description
    pub description: String,
}

impl PluginMetadata {
    /// Create a new plugin metadata
    pub fn new(guid: String, name: String, version: String, description: String) -> Self {
        Self {
            guid,
            name,
            version,
            description,
        }
    }

    /// Get the unique plugin ID (guid@version)
    pub fn id(&self) -> PluginId {
        format!("{}@{}", self.guid, self.version)
    }
}

/// Plugin lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PluginState {
    /// Loaded by the host, not yet initialized
    Loaded,

    /// Initialization in progress
    Initializing,

    /// Running; the trigger follows the settings
    Active,

    /// Initialization failed; the plugin is inert
    Failed,

    /// Shut down by the host
    Unloaded,
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginState::Loaded => write!(f, "loaded"),
            PluginState::Initializing => write!(f, "initializing"),
            PluginState::Active => write!(f, "active"),
            PluginState::Failed => write!(f, "failed"),
            PluginState::Unloaded => write!(f, "unloaded"),
        }
    }
}

/// Keys of the live settings the plugin reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKey {
    /// Whether the custom interval runs at all
    IntervalEnabled,
    /// Seconds between cleaner runs
    IntervalSeconds,
    /// Only run while the player is in an active session
    OnlyInSession,
}

impl SettingKey {
    pub const ALL: [SettingKey; 3] = [
        SettingKey::IntervalEnabled,
        SettingKey::IntervalSeconds,
        SettingKey::OnlyInSession,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::IntervalEnabled => "interval_enabled",
            SettingKey::IntervalSeconds => "interval_seconds",
            SettingKey::OnlyInSession => "only_in_session",
        }
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A setting value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(u64),
}

impl SettingValue {
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            SettingValue::Bool(value) => Ok(*value),
            SettingValue::Int(value) => Err(CleanerError::InvalidConfiguration(format!(
                "expected a boolean, got {}",
                value
            ))),
        }
    }

    pub fn as_int(&self) -> Result<u64> {
        match self {
            SettingValue::Int(value) => Ok(*value),
            SettingValue::Bool(value) => Err(CleanerError::InvalidConfiguration(format!(
                "expected an integer, got {}",
                value
            ))),
        }
    }
}

impl std::fmt::Display for SettingValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingValue::Bool(value) => write!(f, "{}", value),
            SettingValue::Int(value) => write!(f, "{}", value),
        }
    }
}

/// Notification sent to subscribers when a setting is edited
#[derive(Debug, Clone, PartialEq)]
pub struct SettingChange {
    pub key: SettingKey,
    pub old_value: SettingValue,
    pub new_value: SettingValue,
    /// Unix timestamp of the change
    pub timestamp: i64,
}

/// Callback invoked on setting changes
pub type ChangeCallback = Arc<dyn Fn(&SettingChange) + Send + Sync>;

/// Live-reloadable settings supplied by the host
pub trait ConfigSource: Send + Sync {
    /// Current value of a setting
    fn get(&self, key: SettingKey) -> Result<SettingValue>;

    /// Call `callback` whenever `key` is edited
    fn on_change(&self, key: SettingKey, callback: ChangeCallback) -> Result<SubscriptionId>;

    /// Stop a subscription created by `on_change`
    fn unsubscribe(&self, subscription_id: &str) -> Result<()>;
}

/// Game state query used by the "only in session" gate
pub trait SessionStateProvider: Send + Sync {
    /// Whether the player is currently in an active play session
    fn is_in_active_session(&self) -> Result<bool>;
}

/// Services handed to the plugin at initialization
#[derive(Clone)]
pub struct PluginContext {
    /// Live settings
    pub settings: Arc<dyn ConfigSource>,

    /// Game session state
    pub session: Arc<dyn SessionStateProvider>,

    /// Locates the release action
    pub resolver: Arc<dyn ActionResolver>,

    /// Runtime the timer task is spawned on
    pub runtime: Handle,
}

impl PluginContext {
    /// Create a new plugin context
    pub fn new(
        settings: Arc<dyn ConfigSource>,
        session: Arc<dyn SessionStateProvider>,
        resolver: Arc<dyn ActionResolver>,
        runtime: Handle,
    ) -> Self {
        Self {
            settings,
            session,
            resolver,
            runtime,
        }
    }
}
