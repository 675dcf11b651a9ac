//! Live settings store
//!
//! Holds the three cleaner settings, persists them as TOML, validates edits,
//! and notifies per-key subscribers so the plugin can hot reload. Edits made
//! to the file on disk are picked up by an optional watcher.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::types::{
    ChangeCallback, ConfigSource, SettingChange, SettingKey, SettingValue, SubscriptionId,
};
use crate::core::error::{CleanerError, ErrorContext, Result};
use crate::core::trigger::{
    clamp_interval, validate_interval, DEFAULT_INTERVAL_SECS, MAX_INTERVAL_SECS,
    MIN_INTERVAL_SECS,
};

/// Section the settings are grouped under in the host's settings surface
pub const SETTINGS_SECTION: &str = "Override RAM cleaner interval";

/// Persisted cleaner settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanerSettings {
    pub interval_enabled: bool,
    pub interval_seconds: u64,
    pub only_in_session: bool,
}

impl Default for CleanerSettings {
    fn default() -> Self {
        Self {
            interval_enabled: true,
            interval_seconds: DEFAULT_INTERVAL_SECS,
            only_in_session: true,
        }
    }
}

impl CleanerSettings {
    /// Value stored under `key`
    pub fn value(&self, key: SettingKey) -> SettingValue {
        match key {
            SettingKey::IntervalEnabled => SettingValue::Bool(self.interval_enabled),
            SettingKey::IntervalSeconds => SettingValue::Int(self.interval_seconds),
            SettingKey::OnlyInSession => SettingValue::Bool(self.only_in_session),
        }
    }

    /// Copy with `key` replaced, after type and range checks
    fn with_value(mut self, key: SettingKey, value: SettingValue) -> Result<Self> {
        match key {
            SettingKey::IntervalEnabled => self.interval_enabled = value.as_bool()?,
            SettingKey::IntervalSeconds => {
                let secs = value.as_int()?;
                validate_interval(secs)?;
                self.interval_seconds = secs;
            }
            SettingKey::OnlyInSession => self.only_in_session = value.as_bool()?,
        }
        Ok(self)
    }

    /// Bring out-of-range values back into range
    fn clamped(mut self) -> Self {
        let clamped = clamp_interval(self.interval_seconds);
        if clamped != self.interval_seconds {
            tracing::warn!(
                requested = self.interval_seconds,
                interval_secs = clamped,
                "Interval in settings file out of range, clamped"
            );
            self.interval_seconds = clamped;
        }
        self
    }
}

/// How a setting is presented in the host's settings surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SettingKind {
    Toggle { default: bool },
    Range { default: u64, min: u64, max: u64 },
    Button,
}

/// UI description of one entry in the settings section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SettingDescriptor {
    /// Setting backing this entry; `None` for action buttons
    pub key: Option<SettingKey>,
    pub label: &'static str,
    pub description: &'static str,
    /// Higher orders are listed first
    pub order: u32,
    pub kind: SettingKind,
}

/// Entries of the settings section, highest order first
pub fn descriptors() -> [SettingDescriptor; 4] {
    let defaults = CleanerSettings::default();
    [
        SettingDescriptor {
            key: Some(SettingKey::IntervalEnabled),
            label: "Interval enabled",
            description: "Whether or not we should use the custom RAM cleaner interval",
            order: 4,
            kind: SettingKind::Toggle {
                default: defaults.interval_enabled,
            },
        },
        SettingDescriptor {
            key: Some(SettingKey::IntervalSeconds),
            label: "Interval (seconds)",
            description: "Number of seconds between each RAM cleaner execution. Changing this setting resets the interval",
            order: 3,
            kind: SettingKind::Range {
                default: defaults.interval_seconds,
                min: MIN_INTERVAL_SECS,
                max: MAX_INTERVAL_SECS,
            },
        },
        SettingDescriptor {
            key: None,
            label: "Clean now",
            description: "Execute the RAM cleaner now",
            order: 2,
            kind: SettingKind::Button,
        },
        SettingDescriptor {
            key: Some(SettingKey::OnlyInSession),
            label: "Only in session",
            description: "Only run the RAM cleaner while in an active session",
            order: 1,
            kind: SettingKind::Toggle {
                default: defaults.only_in_session,
            },
        },
    ]
}

struct Subscriber {
    id: SubscriptionId,
    key: SettingKey,
    callback: ChangeCallback,
}

/// Settings store with change notifications
///
/// Backed by a TOML file, or purely in memory for hosts that persist
/// settings themselves.
///
/// Edits are serialized: an edit and the notifications it causes complete
/// before the next edit starts, so subscribers see changes in write order.
/// Subscribers may read the store but must not edit it from a callback.
pub struct SettingsStore {
    path: Option<PathBuf>,
    values: RwLock<CleanerSettings>,
    subscribers: RwLock<Vec<Subscriber>>,
    /// Held across a write and its notifications
    edits: Mutex<()>,
}

impl SettingsStore {
    /// Open the settings file at `path`, creating it with defaults if missing
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let settings = if path.exists() {
            match read_settings(&path) {
                Ok(settings) => settings.clamped(),
                // Keep the file as is so the user can fix it
                Err(CleanerError::SerializationError(e)) => {
                    tracing::warn!(path = ?path, error = %e, "Settings file is malformed, using defaults");
                    CleanerSettings::default()
                }
                Err(e) => return Err(e),
            }
        } else {
            let defaults = CleanerSettings::default();
            write_settings(&path, &defaults)?;
            tracing::info!(path = ?path, "Created settings file with defaults");
            defaults
        };

        tracing::info!(
            path = ?path,
            interval_enabled = settings.interval_enabled,
            interval_secs = settings.interval_seconds,
            only_in_session = settings.only_in_session,
            "Settings loaded"
        );

        Ok(Self {
            path: Some(path),
            values: RwLock::new(settings),
            subscribers: RwLock::new(Vec::new()),
            edits: Mutex::new(()),
        })
    }

    /// Store that keeps the settings in memory only
    pub fn in_memory() -> Self {
        Self::with_settings(CleanerSettings::default())
    }

    /// In-memory store seeded with `settings`
    pub fn with_settings(settings: CleanerSettings) -> Self {
        Self {
            path: None,
            values: RwLock::new(settings.clamped()),
            subscribers: RwLock::new(Vec::new()),
            edits: Mutex::new(()),
        }
    }

    /// Path of the backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock_edits(&self) -> MutexGuard<'_, ()> {
        self.edits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of all settings
    pub fn settings(&self) -> Result<CleanerSettings> {
        let values = self.values.read().map_err(|e| {
            CleanerError::ConfigError(format!("Failed to acquire settings lock: {}", e))
        })?;
        Ok(*values)
    }

    /// Edit one setting
    ///
    /// The value is checked, persisted, and then announced to the subscribers
    /// of `key`. Setting the current value again does nothing.
    ///
    /// # Errors
    /// `InvalidConfiguration` for a wrong type or an out-of-range interval;
    /// the stored value is kept.
    pub fn set(&self, key: SettingKey, value: SettingValue) -> Result<()> {
        let _edit = self.lock_edits();

        let change = {
            let mut values = self.values.write().map_err(|e| {
                CleanerError::ConfigError(format!("Failed to acquire settings lock: {}", e))
            })?;

            let old_value = values.value(key);
            if old_value == value {
                tracing::debug!(key = %key, value = %value, "Setting unchanged");
                return Ok(());
            }

            let updated = values.with_value(key, value).map_err(|e| {
                tracing::warn!(key = %key, value = %value, error = %e, "Rejected setting change");
                e
            })?;

            if let Some(path) = &self.path {
                write_settings(path, &updated)?;
            }
            *values = updated;

            SettingChange {
                key,
                old_value,
                new_value: value,
                timestamp: chrono::Utc::now().timestamp(),
            }
        };

        tracing::info!(
            key = %key,
            old_value = %change.old_value,
            new_value = %change.new_value,
            "Setting changed"
        );

        self.notify(&change)?;
        Ok(())
    }

    /// Re-read the backing file and announce whatever changed
    ///
    /// Out-of-range values in the file are clamped. In-memory stores have
    /// nothing to reload.
    pub fn reload(&self) -> Result<Vec<SettingChange>> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };

        let _edit = self.lock_edits();
        let loaded = read_settings(path)?.clamped();
        let timestamp = chrono::Utc::now().timestamp();

        let changes: Vec<SettingChange> = {
            let mut values = self.values.write().map_err(|e| {
                CleanerError::ConfigError(format!("Failed to acquire settings lock: {}", e))
            })?;

            let changes = SettingKey::ALL
                .iter()
                .filter(|key| values.value(**key) != loaded.value(**key))
                .map(|key| SettingChange {
                    key: *key,
                    old_value: values.value(*key),
                    new_value: loaded.value(*key),
                    timestamp,
                })
                .collect();

            *values = loaded;
            changes
        };

        if !changes.is_empty() {
            tracing::info!(path = ?path, changed = changes.len(), "Settings reloaded from disk");
        }

        for change in &changes {
            self.notify(change)?;
        }

        Ok(changes)
    }

    /// Reload the settings whenever the backing file is edited
    ///
    /// Must be called from within a tokio runtime. Watching stops when the
    /// returned handle is dropped.
    pub fn watch(self: &Arc<Self>) -> Result<SettingsWatcher> {
        let path = self.path.clone().ok_or_else(|| {
            CleanerError::WatchError("in-memory settings have no file to watch".to_string())
        })?;
        let runtime = Handle::try_current()
            .map_err(|e| CleanerError::WatchError(format!("No tokio runtime: {}", e)))?;

        let file_name = path
            .file_name()
            .map(|name| name.to_os_string())
            .ok_or_else(|| CleanerError::WatchError(format!("Not a file: {}", path.display())))?;
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, mut rx) = mpsc::channel(16);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.blocking_send(res);
            },
            notify::Config::default(),
        )?;
        watcher.watch(&directory, RecursiveMode::NonRecursive)?;

        let store: Weak<Self> = Arc::downgrade(self);
        let task = runtime.spawn(async move {
            while let Some(result) = rx.recv().await {
                let event = match result {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!(error = %e, "Settings watcher error");
                        continue;
                    }
                };

                let touches_file = event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == Some(file_name.as_os_str()));
                if !touches_file || !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    continue;
                }

                let Some(store) = store.upgrade() else {
                    break;
                };
                if let Err(e) = store.reload() {
                    tracing::warn!(error = %e, "Failed to reload settings file");
                }
            }
        });

        tracing::info!(path = ?path, "Watching settings file");

        Ok(SettingsWatcher {
            _watcher: watcher,
            task,
        })
    }

    fn notify(&self, change: &SettingChange) -> Result<()> {
        let callbacks: Vec<ChangeCallback> = {
            let subscribers = self.subscribers.read().map_err(|e| {
                CleanerError::ConfigError(format!("Failed to acquire subscribers lock: {}", e))
            })?;
            subscribers
                .iter()
                .filter(|s| s.key == change.key)
                .map(|s| Arc::clone(&s.callback))
                .collect()
        };

        for callback in callbacks {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(change))).is_err() {
                tracing::error!(key = %change.key, "Settings subscriber panicked");
            }
        }

        Ok(())
    }
}

impl ConfigSource for SettingsStore {
    fn get(&self, key: SettingKey) -> Result<SettingValue> {
        Ok(self.settings()?.value(key))
    }

    fn on_change(&self, key: SettingKey, callback: ChangeCallback) -> Result<SubscriptionId> {
        let id = Uuid::new_v4().to_string();
        let mut subscribers = self.subscribers.write().map_err(|e| {
            CleanerError::ConfigError(format!("Failed to acquire subscribers lock: {}", e))
        })?;

        subscribers.push(Subscriber {
            id: id.clone(),
            key,
            callback,
        });
        Ok(id)
    }

    fn unsubscribe(&self, subscription_id: &str) -> Result<()> {
        let mut subscribers = self.subscribers.write().map_err(|e| {
            CleanerError::ConfigError(format!("Failed to acquire subscribers lock: {}", e))
        })?;

        let before = subscribers.len();
        subscribers.retain(|s| s.id != subscription_id);
        if subscribers.len() == before {
            return Err(CleanerError::ConfigError(format!(
                "Subscription not found: {}",
                subscription_id
            )));
        }
        Ok(())
    }
}

/// Keeps the settings file watcher running
pub struct SettingsWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for SettingsWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn read_settings(path: &Path) -> Result<CleanerSettings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {}", path.display()))?;
    Ok(toml::from_str(&content)?)
}

/// Write through a temporary file so readers never see a partial file
fn write_settings(path: &Path, settings: &CleanerSettings) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create settings directory {}", parent.display()))?;
    }

    let content = toml::to_string_pretty(settings)?;
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    std::fs::write(&temp, content)
        .with_context(|| format!("Failed to write settings file {}", temp.display()))?;
    std::fs::rename(&temp, path)
        .with_context(|| format!("Failed to replace settings file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn recorder(store: &SettingsStore, key: SettingKey) -> (Arc<Mutex<Vec<SettingChange>>>, SubscriptionId) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = store
            .on_change(key, Arc::new(move |change: &SettingChange| {
                sink.lock().unwrap().push(change.clone());
            }))
            .unwrap();
        (seen, id)
    }

    #[test]
    fn test_defaults() {
        let store = SettingsStore::in_memory();
        assert_eq!(store.get(SettingKey::IntervalEnabled).unwrap(), SettingValue::Bool(true));
        assert_eq!(store.get(SettingKey::IntervalSeconds).unwrap(), SettingValue::Int(300));
        assert_eq!(store.get(SettingKey::OnlyInSession).unwrap(), SettingValue::Bool(true));
        assert!(store.path().is_none());
    }

    #[test]
    fn test_set_rejects_invalid_values() {
        let store = SettingsStore::in_memory();

        let err = store
            .set(SettingKey::IntervalSeconds, SettingValue::Int(10))
            .unwrap_err();
        assert!(matches!(err, CleanerError::InvalidConfiguration(_)));

        assert!(store.set(SettingKey::IntervalSeconds, SettingValue::Int(901)).is_err());
        assert!(store.set(SettingKey::IntervalEnabled, SettingValue::Int(1)).is_err());
        assert!(store.set(SettingKey::IntervalSeconds, SettingValue::Bool(true)).is_err());

        assert_eq!(store.settings().unwrap(), CleanerSettings::default());
    }

    #[test]
    fn test_change_notification_per_key() {
        let store = SettingsStore::in_memory();
        let (interval_changes, _) = recorder(&store, SettingKey::IntervalSeconds);
        let (enabled_changes, _) = recorder(&store, SettingKey::IntervalEnabled);

        store.set(SettingKey::IntervalSeconds, SettingValue::Int(60)).unwrap();

        let seen = interval_changes.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].key, SettingKey::IntervalSeconds);
        assert_eq!(seen[0].old_value, SettingValue::Int(300));
        assert_eq!(seen[0].new_value, SettingValue::Int(60));
        assert!(enabled_changes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unchanged_value_is_not_announced() {
        let store = SettingsStore::in_memory();
        let (changes, _) = recorder(&store, SettingKey::IntervalEnabled);

        store.set(SettingKey::IntervalEnabled, SettingValue::Bool(true)).unwrap();
        assert!(changes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_rejected_value_is_not_announced() {
        let store = SettingsStore::in_memory();
        let (changes, _) = recorder(&store, SettingKey::IntervalSeconds);

        assert!(store.set(SettingKey::IntervalSeconds, SettingValue::Int(5)).is_err());
        assert!(changes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unsubscribe() {
        let store = SettingsStore::in_memory();
        let (changes, id) = recorder(&store, SettingKey::OnlyInSession);

        store.unsubscribe(&id).unwrap();
        store.set(SettingKey::OnlyInSession, SettingValue::Bool(false)).unwrap();

        assert!(changes.lock().unwrap().is_empty());
        assert!(store.unsubscribe(&id).is_err());
    }

    #[test]
    fn test_panicking_subscriber_does_not_block_others() {
        let store = SettingsStore::in_memory();
        store
            .on_change(
                SettingKey::IntervalEnabled,
                Arc::new(|_: &SettingChange| panic!("subscriber failure")),
            )
            .unwrap();
        let (changes, _) = recorder(&store, SettingKey::IntervalEnabled);

        store.set(SettingKey::IntervalEnabled, SettingValue::Bool(false)).unwrap();
        assert_eq!(changes.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_open_creates_file_and_persists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cleaner").join("settings.toml");

        {
            let store = SettingsStore::open(&path).unwrap();
            assert!(path.exists());
            assert_eq!(store.settings().unwrap(), CleanerSettings::default());

            store.set(SettingKey::IntervalSeconds, SettingValue::Int(120)).unwrap();
            store.set(SettingKey::OnlyInSession, SettingValue::Bool(false)).unwrap();
        }

        let reopened = SettingsStore::open(&path).unwrap();
        let settings = reopened.settings().unwrap();
        assert_eq!(settings.interval_seconds, 120);
        assert!(!settings.only_in_session);
        assert!(settings.interval_enabled);
    }

    #[test]
    fn test_open_fills_missing_fields_and_clamps() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.toml");
        std::fs::write(&path, "interval_seconds = 5\n").unwrap();

        let store = SettingsStore::open(&path).unwrap();
        let settings = store.settings().unwrap();
        assert_eq!(settings.interval_seconds, MIN_INTERVAL_SECS);
        assert!(settings.interval_enabled);
        assert!(settings.only_in_session);
    }

    #[test]
    fn test_open_malformed_file_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.toml");

        for content in ["interval_seconds = -5\n", "interval_enabled = \"yes\"\n"] {
            std::fs::write(&path, content).unwrap();

            let store = SettingsStore::open(&path).unwrap();
            assert_eq!(store.settings().unwrap(), CleanerSettings::default());

            // The user's file is left for them to fix
            assert_eq!(std::fs::read_to_string(&path).unwrap(), content);
        }
    }

    #[test]
    fn test_concurrent_edits_notify_in_write_order() {
        let store = Arc::new(SettingsStore::in_memory());
        let applied = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&applied);
        store
            .on_change(
                SettingKey::IntervalEnabled,
                Arc::new(move |change: &SettingChange| {
                    let enabled = change.new_value.as_bool().unwrap();
                    if !enabled {
                        std::thread::sleep(Duration::from_millis(300));
                    }
                    sink.lock().unwrap().push(enabled);
                }),
            )
            .unwrap();

        let writer = Arc::clone(&store);
        let disable = std::thread::spawn(move || {
            writer
                .set(SettingKey::IntervalEnabled, SettingValue::Bool(false))
                .unwrap();
        });

        std::thread::sleep(Duration::from_millis(100));
        store
            .set(SettingKey::IntervalEnabled, SettingValue::Bool(true))
            .unwrap();
        disable.join().unwrap();

        assert_eq!(*applied.lock().unwrap(), vec![false, true]);
        assert_eq!(
            store.get(SettingKey::IntervalEnabled).unwrap(),
            SettingValue::Bool(true)
        );
    }

    #[test]
    fn test_reload_announces_file_edits() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.toml");
        let store = SettingsStore::open(&path).unwrap();
        let (interval_changes, _) = recorder(&store, SettingKey::IntervalSeconds);
        let (enabled_changes, _) = recorder(&store, SettingKey::IntervalEnabled);

        std::fs::write(
            &path,
            "interval_enabled = false\ninterval_seconds = 5000\nonly_in_session = true\n",
        )
        .unwrap();

        let changes = store.reload().unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(
            interval_changes.lock().unwrap()[0].new_value,
            SettingValue::Int(MAX_INTERVAL_SECS)
        );
        assert_eq!(
            enabled_changes.lock().unwrap()[0].new_value,
            SettingValue::Bool(false)
        );

        // Nothing changed since the last reload
        assert!(store.reload().unwrap().is_empty());
    }

    #[test]
    fn test_reload_rejects_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.toml");
        let store = SettingsStore::open(&path).unwrap();

        std::fs::write(&path, "interval_seconds = \"often\"\n").unwrap();
        assert!(matches!(
            store.reload(),
            Err(CleanerError::SerializationError(_))
        ));
        assert_eq!(store.settings().unwrap(), CleanerSettings::default());
    }

    #[test]
    fn test_descriptors_order() {
        let entries = descriptors();
        let orders: Vec<u32> = entries.iter().map(|d| d.order).collect();
        assert_eq!(orders, [4, 3, 2, 1]);
        assert_eq!(entries[2].kind, SettingKind::Button);
        assert_eq!(
            entries[1].kind,
            SettingKind::Range {
                default: 300,
                min: 30,
                max: 900
            }
        );
    }

    #[tokio::test]
    async fn test_watch_requires_file() {
        let store = Arc::new(SettingsStore::in_memory());
        assert!(matches!(store.watch(), Err(CleanerError::WatchError(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_watch_reloads_on_edit() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.toml");
        let store = Arc::new(SettingsStore::open(&path).unwrap());
        let _watcher = store.watch().unwrap();

        std::fs::write(
            &path,
            "interval_enabled = true\ninterval_seconds = 90\nonly_in_session = true\n",
        )
        .unwrap();

        let mut interval = 0;
        for _ in 0..100 {
            interval = store.settings().unwrap().interval_seconds;
            if interval == 90 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(interval, 90);
    }
}
