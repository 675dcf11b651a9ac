//! The RAM cleaner plugin
//!
//! Wires the live settings to an [`IntervalTrigger`] that periodically runs
//! the release action, gated on the player being in an active session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{error, info, warn};

use super::types::{
    ConfigSource, Plugin, PluginContext, PluginMetadata, PluginState, SessionStateProvider,
    SettingChange, SettingKey, SubscriptionId,
};
use crate::core::error::{CleanerError, Result};
use crate::core::trigger::{IntervalTrigger, TickGate, TickOutcome, TriggerAction, TriggerStats};

pub const PLUGIN_GUID: &str = "com.cactuspie.ramcleanerinterval";
pub const PLUGIN_NAME: &str = "RamCleanerInterval";

/// Gate that only opens while the player is in an active session
///
/// The `only_in_session` setting is read on every tick, so toggling it takes
/// effect without touching the trigger.
pub struct SessionGate {
    settings: Arc<dyn ConfigSource>,
    session: Arc<dyn SessionStateProvider>,
}

impl SessionGate {
    pub fn new(settings: Arc<dyn ConfigSource>, session: Arc<dyn SessionStateProvider>) -> Self {
        Self { settings, session }
    }
}

impl TickGate for SessionGate {
    fn permits(&self) -> Result<bool> {
        let only_in_session = self
            .settings
            .get(SettingKey::OnlyInSession)
            .and_then(|value| value.as_bool())
            .map_err(as_gate_error)?;

        if !only_in_session {
            return Ok(true);
        }

        self.session.is_in_active_session().map_err(as_gate_error)
    }
}

fn as_gate_error(err: CleanerError) -> CleanerError {
    match err {
        CleanerError::GateEvaluationError(_) => err,
        other => CleanerError::GateEvaluationError(other.to_string()),
    }
}

/// Release action announcing each run
struct CleanerAction {
    inner: Arc<dyn TriggerAction>,
}

impl TriggerAction for CleanerAction {
    fn invoke(&self) -> Result<()> {
        info!("Executing the RAM cleaner");
        self.inner.invoke()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Everything that only exists while the plugin is active
struct Running {
    trigger: Arc<IntervalTrigger>,
    settings: Arc<dyn ConfigSource>,
    subscriptions: Vec<SubscriptionId>,
}

/// Periodic RAM cleaner
pub struct RamCleanerPlugin {
    metadata: PluginMetadata,
    state: Mutex<PluginState>,
    running: Mutex<Option<Running>>,
}

impl Default for RamCleanerPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl RamCleanerPlugin {
    pub fn new() -> Self {
        Self {
            metadata: PluginMetadata::new(
                PLUGIN_GUID.to_string(),
                PLUGIN_NAME.to_string(),
                crate::VERSION.to_string(),
                "Runs the RAM cleaner on a configurable interval".to_string(),
            ),
            state: Mutex::new(PluginState::Loaded),
            running: Mutex::new(None),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PluginState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: PluginState) {
        let mut current = self.lock_state();
        if *current != state {
            info!(plugin_id = %self.metadata.id(), from = %*current, to = %state, "Plugin state changed");
            *current = state;
        }
    }

    /// The "Clean now" button: run the cleaner immediately
    ///
    /// The session gate is bypassed and the interval schedule is untouched.
    ///
    /// # Errors
    /// `InvalidState` unless the plugin is active.
    pub fn clean_now(&self) -> Result<TickOutcome> {
        let trigger = self.trigger().ok_or_else(|| {
            CleanerError::InvalidState(format!("cannot clean while {}", self.state()))
        })?;
        Ok(trigger.force_now())
    }

    /// The running trigger, while the plugin is active
    pub fn trigger(&self) -> Option<Arc<IntervalTrigger>> {
        self.lock_running()
            .as_ref()
            .map(|running| Arc::clone(&running.trigger))
    }

    /// Trigger counters, while the plugin is active
    pub fn stats(&self) -> Option<TriggerStats> {
        self.trigger().map(|trigger| trigger.stats())
    }

    fn start(&self, context: &PluginContext) -> Result<Running> {
        let action = context.resolver.resolve()?;
        info!(action = action.name(), "Release action resolved");

        let enabled = context.settings.get(SettingKey::IntervalEnabled)?.as_bool()?;
        let interval_secs = context.settings.get(SettingKey::IntervalSeconds)?.as_int()?;

        let gate = SessionGate::new(Arc::clone(&context.settings), Arc::clone(&context.session));
        let trigger = Arc::new(IntervalTrigger::with_runtime(
            context.runtime.clone(),
            interval_secs,
            enabled,
            Arc::new(CleanerAction { inner: action }),
            Arc::new(gate),
        ));

        let subscriptions = match subscribe(context.settings.as_ref(), &trigger) {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                trigger.shutdown();
                return Err(e);
            }
        };

        Ok(Running {
            trigger,
            settings: Arc::clone(&context.settings),
            subscriptions,
        })
    }
}

/// Route setting edits to the trigger
///
/// The callbacks only hold a weak reference, so the settings source never
/// keeps a timer alive.
/// Edits are delivered in write order, so applying `new_value` leaves the
/// trigger matching the stored settings.
fn subscribe(
    settings: &dyn ConfigSource,
    trigger: &Arc<IntervalTrigger>,
) -> Result<Vec<SubscriptionId>> {
    let weak: Weak<IntervalTrigger> = Arc::downgrade(trigger);
    let enabled_id = settings.on_change(
        SettingKey::IntervalEnabled,
        Arc::new(move |change: &SettingChange| {
            let Some(trigger) = weak.upgrade() else {
                return;
            };
            match change.new_value.as_bool() {
                Ok(enabled) => trigger.set_enabled(enabled),
                Err(e) => warn!(key = %change.key, error = %e, "Ignoring setting change"),
            }
        }),
    )?;

    let weak: Weak<IntervalTrigger> = Arc::downgrade(trigger);
    let interval_id = settings.on_change(
        SettingKey::IntervalSeconds,
        Arc::new(move |change: &SettingChange| {
            let Some(trigger) = weak.upgrade() else {
                return;
            };
            // Rejected values are logged by the trigger
            match change.new_value.as_int() {
                Ok(secs) => {
                    let _ = trigger.set_interval(secs);
                }
                Err(e) => warn!(key = %change.key, error = %e, "Ignoring setting change"),
            }
        }),
    );

    match interval_id {
        Ok(interval_id) => Ok(vec![enabled_id, interval_id]),
        Err(e) => {
            let _ = settings.unsubscribe(&enabled_id);
            Err(e)
        }
    }
}

#[async_trait::async_trait]
impl Plugin for RamCleanerPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    fn state(&self) -> PluginState {
        *self.lock_state()
    }

    async fn initialize(&self, context: &PluginContext) -> Result<()> {
        let state = self.state();
        if state != PluginState::Loaded {
            return Err(CleanerError::InvalidState(format!(
                "cannot initialize while {}",
                state
            )));
        }

        self.set_state(PluginState::Initializing);

        match self.start(context) {
            Ok(running) => {
                info!(
                    plugin_id = %self.metadata.id(),
                    interval_secs = running.trigger.interval_secs(),
                    enabled = running.trigger.is_enabled(),
                    "RAM cleaner started"
                );
                *self.lock_running() = Some(running);
                self.set_state(PluginState::Active);
                Ok(())
            }
            Err(e) => {
                error!(
                    plugin_id = %self.metadata.id(),
                    error_type = e.error_type(),
                    error = %e,
                    "RAM cleaner failed to start"
                );
                self.set_state(PluginState::Failed);
                Err(e)
            }
        }
    }

    async fn shutdown(&self) -> Result<()> {
        let running = self.lock_running().take();

        if let Some(running) = running {
            for id in &running.subscriptions {
                if let Err(e) = running.settings.unsubscribe(id) {
                    warn!(subscription_id = %id, error = %e, "Failed to unsubscribe");
                }
            }
            running.trigger.shutdown();
        }

        self.set_state(PluginState::Unloaded);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::release::StaticResolver;
    use crate::plugin::session::{SessionSnapshot, SharedSessionState};
    use crate::plugin::settings::SettingsStore;
    use crate::plugin::types::SettingValue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::runtime::Handle;

    struct Harness {
        plugin: RamCleanerPlugin,
        settings: Arc<SettingsStore>,
        session: Arc<SharedSessionState>,
        calls: Arc<AtomicUsize>,
        context: PluginContext,
    }

    fn harness() -> Harness {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let action: Arc<dyn TriggerAction> = Arc::new(move || -> Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let settings = Arc::new(SettingsStore::in_memory());
        let session = Arc::new(SharedSessionState::new());
        let context = PluginContext::new(
            settings.clone(),
            session.clone(),
            Arc::new(StaticResolver::new(action)),
            Handle::current(),
        );

        Harness {
            plugin: RamCleanerPlugin::new(),
            settings,
            session,
            calls,
            context,
        }
    }

    impl Harness {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    async fn elapse(secs: f64) {
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_resolution_failure_leaves_plugin_inert() {
        let h = harness();
        let context = PluginContext::new(
            h.settings.clone(),
            h.session.clone(),
            Arc::new(StaticResolver::missing()),
            Handle::current(),
        );

        let err = h.plugin.initialize(&context).await.unwrap_err();
        assert!(matches!(err, CleanerError::StartupResolutionFailure(_)));
        assert_eq!(h.plugin.state(), PluginState::Failed);
        assert!(h.plugin.trigger().is_none());
        assert!(matches!(
            h.plugin.clean_now(),
            Err(CleanerError::InvalidState(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_follows_settings() {
        let h = harness();
        h.settings
            .set(SettingKey::IntervalSeconds, SettingValue::Int(60))
            .unwrap();

        h.plugin.initialize(&h.context).await.unwrap();
        assert_eq!(h.plugin.state(), PluginState::Active);

        let trigger = h.plugin.trigger().unwrap();
        assert_eq!(trigger.interval_secs(), 60);
        assert!(trigger.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_twice_is_rejected() {
        let h = harness();
        h.plugin.initialize(&h.context).await.unwrap();

        assert!(matches!(
            h.plugin.initialize(&h.context).await,
            Err(CleanerError::InvalidState(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_setting_edits_rearm_and_disarm() {
        let h = harness();
        h.settings
            .set(SettingKey::OnlyInSession, SettingValue::Bool(false))
            .unwrap();
        h.plugin.initialize(&h.context).await.unwrap();
        let trigger = h.plugin.trigger().unwrap();

        h.settings
            .set(SettingKey::IntervalEnabled, SettingValue::Bool(false))
            .unwrap();
        assert!(!trigger.is_armed());

        elapse(600.0).await;
        assert_eq!(h.calls(), 0);

        h.settings
            .set(SettingKey::IntervalSeconds, SettingValue::Int(30))
            .unwrap();
        assert_eq!(trigger.interval_secs(), 30);
        assert!(!trigger.is_armed());

        h.settings
            .set(SettingKey::IntervalEnabled, SettingValue::Bool(true))
            .unwrap();
        assert!(trigger.is_armed());

        elapse(30.5).await;
        assert_eq!(h.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_edits_leave_trigger_matching_settings() {
        let h = harness();
        // A slow host subscriber delays the disable notification
        h.settings
            .on_change(
                SettingKey::IntervalEnabled,
                Arc::new(|change: &SettingChange| {
                    if change.new_value == SettingValue::Bool(false) {
                        std::thread::sleep(Duration::from_millis(300));
                    }
                }),
            )
            .unwrap();
        h.plugin.initialize(&h.context).await.unwrap();
        let trigger = h.plugin.trigger().unwrap();

        let settings = Arc::clone(&h.settings);
        let disable = std::thread::spawn(move || {
            settings
                .set(SettingKey::IntervalEnabled, SettingValue::Bool(false))
                .unwrap();
        });

        std::thread::sleep(Duration::from_millis(100));
        h.settings
            .set(SettingKey::IntervalEnabled, SettingValue::Bool(true))
            .unwrap();
        disable.join().unwrap();

        assert_eq!(
            h.settings.get(SettingKey::IntervalEnabled).unwrap(),
            SettingValue::Bool(true)
        );
        assert!(trigger.is_enabled());
        assert!(trigger.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_edit_resets_phase() {
        let h = harness();
        h.settings
            .set(SettingKey::OnlyInSession, SettingValue::Bool(false))
            .unwrap();
        h.plugin.initialize(&h.context).await.unwrap();

        elapse(200.0).await;
        h.settings
            .set(SettingKey::IntervalSeconds, SettingValue::Int(60))
            .unwrap();

        elapse(59.5).await;
        assert_eq!(h.calls(), 0);

        elapse(1.0).await;
        assert_eq!(h.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_gate_controls_ticks() {
        let h = harness();
        h.settings
            .set(SettingKey::IntervalSeconds, SettingValue::Int(30))
            .unwrap();
        h.plugin.initialize(&h.context).await.unwrap();

        // Main menu
        elapse(30.5).await;
        assert_eq!(h.calls(), 0);

        h.session
            .update(SessionSnapshot::in_location("hideout"))
            .unwrap();
        elapse(30.0).await;
        assert_eq!(h.calls(), 0);

        h.session
            .update(SessionSnapshot::in_location("bigmap"))
            .unwrap();
        elapse(30.0).await;
        assert_eq!(h.calls(), 1);

        let stats = h.plugin.stats().unwrap();
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.executed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_in_session_off_opens_gate() {
        let h = harness();
        h.settings
            .set(SettingKey::IntervalSeconds, SettingValue::Int(30))
            .unwrap();
        h.plugin.initialize(&h.context).await.unwrap();

        h.settings
            .set(SettingKey::OnlyInSession, SettingValue::Bool(false))
            .unwrap();

        elapse(30.5).await;
        assert_eq!(h.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_now_bypasses_session_gate() {
        let h = harness();
        h.plugin.initialize(&h.context).await.unwrap();

        assert_eq!(h.plugin.clean_now().unwrap(), TickOutcome::Executed);
        assert_eq!(h.calls(), 1);
        assert_eq!(h.plugin.stats().unwrap().forced, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_now_before_initialize_fails() {
        let h = harness();
        assert!(matches!(
            h.plugin.clean_now(),
            Err(CleanerError::InvalidState(_))
        ));
        assert_eq!(h.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_timer_and_ignores_edits() {
        let h = harness();
        h.settings
            .set(SettingKey::OnlyInSession, SettingValue::Bool(false))
            .unwrap();
        h.plugin.initialize(&h.context).await.unwrap();
        let trigger = h.plugin.trigger().unwrap();

        h.plugin.shutdown().await.unwrap();
        assert_eq!(h.plugin.state(), PluginState::Unloaded);
        assert!(!trigger.is_armed());

        h.settings
            .set(SettingKey::IntervalEnabled, SettingValue::Bool(false))
            .unwrap();
        h.settings
            .set(SettingKey::IntervalEnabled, SettingValue::Bool(true))
            .unwrap();
        assert!(!trigger.is_armed());

        elapse(900.0).await;
        assert_eq!(h.calls(), 0);
    }

    #[test]
    fn test_gate_wraps_provider_errors() {
        struct BrokenSession;
        impl SessionStateProvider for BrokenSession {
            fn is_in_active_session(&self) -> Result<bool> {
                Err(CleanerError::ConfigError("engine not ready".into()))
            }
        }

        let gate = SessionGate::new(Arc::new(SettingsStore::in_memory()), Arc::new(BrokenSession));
        assert!(matches!(
            gate.permits(),
            Err(CleanerError::GateEvaluationError(_))
        ));
    }
}
