//! Reconfigurable interval trigger
//!
//! The trigger owns a single repeating timer and dispatches a gated action on
//! each tick. It supports:
//! - Arming and disarming at runtime without losing the stored interval
//! - Interval changes that take effect immediately (phase reset while armed)
//! - A forced run that bypasses the gate and leaves the schedule untouched
//! - Isolated failure handling (a failing action never stops future ticks)
//!
//! Ticks are delivered on a tokio task. Reconfiguration runs under the
//! schedule lock; action invocations are serialized by the dispatcher lock.

use crate::core::error::{CleanerError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shortest accepted interval between ticks, in seconds
pub const MIN_INTERVAL_SECS: u64 = 30;

/// Longest accepted interval between ticks, in seconds
pub const MAX_INTERVAL_SECS: u64 = 900;

/// Interval used when nothing else is configured, in seconds
pub const DEFAULT_INTERVAL_SECS: u64 = 300;

/// The recurring action fired by the trigger
///
/// Implementations must be cheap and non-blocking; they run on the timer task.
/// They may read the trigger's state but must not call `on_tick` or
/// `force_now` themselves.
pub trait TriggerAction: Send + Sync {
    /// Run the action once
    fn invoke(&self) -> Result<()>;

    /// Name used in log fields
    fn name(&self) -> &str {
        "action"
    }
}

impl<F> TriggerAction for F
where
    F: Fn() -> Result<()> + Send + Sync,
{
    fn invoke(&self) -> Result<()> {
        self()
    }
}

/// Predicate evaluated before every scheduled tick
pub trait TickGate: Send + Sync {
    /// Whether the action may run on this tick
    fn permits(&self) -> Result<bool>;
}

impl<F> TickGate for F
where
    F: Fn() -> Result<bool> + Send + Sync,
{
    fn permits(&self) -> Result<bool> {
        self()
    }
}

/// Gate that never suppresses a tick
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenGate;

impl TickGate for OpenGate {
    fn permits(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Result of a single tick or forced run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickOutcome {
    /// The action ran and succeeded
    Executed,
    /// The gate was closed (or failed to evaluate)
    Skipped,
    /// The action ran and failed
    Failed,
}

/// Counters describing what the trigger has done so far
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerStats {
    /// Scheduled ticks delivered by the timer
    pub ticks: u64,
    /// Successful action runs (scheduled and forced)
    pub executed: u64,
    /// Scheduled ticks suppressed by the gate
    pub skipped: u64,
    /// Failed action runs (scheduled and forced)
    pub failed: u64,
    /// Forced runs requested through `force_now`
    pub forced: u64,
    /// Time of the last successful action run
    pub last_run: Option<DateTime<Utc>>,
}

/// Validate an interval in seconds and convert it to a duration
pub fn validate_interval(secs: u64) -> Result<Duration> {
    if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&secs) {
        return Err(CleanerError::InvalidConfiguration(format!(
            "interval must be between {} and {} seconds, got {}",
            MIN_INTERVAL_SECS, MAX_INTERVAL_SECS, secs
        )));
    }
    Ok(Duration::from_secs(secs))
}

/// Clamp an interval in seconds into the accepted range
pub fn clamp_interval(secs: u64) -> u64 {
    secs.clamp(MIN_INTERVAL_SECS, MAX_INTERVAL_SECS)
}

/// Runs the gate and the action, and keeps the stats
///
/// Shared between the trigger and its timer task. The dispatch lock
/// serializes runs; the stats lock is only held while counters change.
struct Dispatcher {
    action: Arc<dyn TriggerAction>,
    gate: Arc<dyn TickGate>,
    dispatch: Mutex<()>,
    stats: Mutex<TriggerStats>,
}

impl Dispatcher {
    fn new(action: Arc<dyn TriggerAction>, gate: Arc<dyn TickGate>) -> Self {
        Self {
            action,
            gate,
            dispatch: Mutex::new(()),
            stats: Mutex::new(TriggerStats::default()),
        }
    }

    fn lock_dispatch(&self) -> MutexGuard<'_, ()> {
        self.dispatch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_stats(&self) -> MutexGuard<'_, TriggerStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_tick(&self) -> TickOutcome {
        let _turn = self.lock_dispatch();
        self.lock_stats().ticks += 1;

        if !self.evaluate_gate() {
            self.lock_stats().skipped += 1;
            debug!(action = self.action.name(), "Gate closed, skipping tick");
            return TickOutcome::Skipped;
        }

        self.run(false)
    }

    fn force(&self) -> TickOutcome {
        let _turn = self.lock_dispatch();
        self.lock_stats().forced += 1;
        self.run(true)
    }

    /// Fail-closed: an erroring or panicking gate denies the tick
    fn evaluate_gate(&self) -> bool {
        let result = match panic::catch_unwind(AssertUnwindSafe(|| self.gate.permits())) {
            Ok(result) => result,
            Err(payload) => Err(CleanerError::GateEvaluationError(panic_message(&*payload))),
        };

        match result {
            Ok(permitted) => permitted,
            Err(e) => {
                error!(
                    action = self.action.name(),
                    error_type = e.error_type(),
                    error = %e,
                    "Gate evaluation failed, skipping tick"
                );
                false
            }
        }
    }

    fn run(&self, forced: bool) -> TickOutcome {
        let result = match panic::catch_unwind(AssertUnwindSafe(|| self.action.invoke())) {
            Ok(result) => result,
            Err(payload) => Err(CleanerError::ActionInvocationError(panic_message(&*payload))),
        };

        match result {
            Ok(()) => {
                let mut stats = self.lock_stats();
                stats.executed += 1;
                stats.last_run = Some(Utc::now());
                TickOutcome::Executed
            }
            Err(e) => {
                self.lock_stats().failed += 1;
                error!(
                    action = self.action.name(),
                    forced,
                    error_type = e.error_type(),
                    error = %e,
                    "Action invocation failed"
                );
                TickOutcome::Failed
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

/// The timer task of one armed period
struct ArmedTimer {
    cancel: CancellationToken,
    armed_at: Instant,
    _task: JoinHandle<()>,
}

struct Schedule {
    interval: Duration,
    enabled: bool,
    timer: Option<ArmedTimer>,
}

/// A repeating timer with a gate, an on/off switch and an interval knob
///
/// The timer is armed exactly when the trigger is enabled. Dropping the
/// trigger disarms it.
pub struct IntervalTrigger {
    runtime: Handle,
    schedule: Mutex<Schedule>,
    dispatcher: Arc<Dispatcher>,
}

impl IntervalTrigger {
    /// Create a trigger on the current tokio runtime
    ///
    /// The interval is clamped into `[MIN_INTERVAL_SECS, MAX_INTERVAL_SECS]`.
    /// When `enabled` is true the timer is armed immediately and the first
    /// tick happens one full interval later.
    ///
    /// # Errors
    /// `InitializationError` when called outside a tokio runtime.
    pub fn initialize(
        interval_secs: u64,
        enabled: bool,
        action: Arc<dyn TriggerAction>,
        gate: Arc<dyn TickGate>,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            CleanerError::InitializationError(format!(
                "interval trigger needs a tokio runtime: {}",
                e
            ))
        })?;

        Ok(Self::with_runtime(runtime, interval_secs, enabled, action, gate))
    }

    /// Create a trigger whose timer tasks are spawned on `runtime`
    pub fn with_runtime(
        runtime: Handle,
        interval_secs: u64,
        enabled: bool,
        action: Arc<dyn TriggerAction>,
        gate: Arc<dyn TickGate>,
    ) -> Self {
        let clamped = clamp_interval(interval_secs);
        if clamped != interval_secs {
            warn!(
                requested = interval_secs,
                interval_secs = clamped,
                "Interval out of range, clamped"
            );
        }

        let trigger = Self {
            runtime,
            schedule: Mutex::new(Schedule {
                interval: Duration::from_secs(clamped),
                enabled: false,
                timer: None,
            }),
            dispatcher: Arc::new(Dispatcher::new(action, gate)),
        };

        if enabled {
            trigger.set_enabled(true);
        }

        info!(
            action = trigger.dispatcher.action.name(),
            interval_secs = clamped,
            enabled,
            "Interval trigger initialized"
        );

        trigger
    }

    fn lock_schedule(&self) -> MutexGuard<'_, Schedule> {
        self.schedule.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm or disarm the timer
    ///
    /// Arming schedules the first tick one full interval from now. Disarming
    /// stops future ticks; a tick already running finishes. Setting the
    /// current value again does nothing.
    pub fn set_enabled(&self, enabled: bool) {
        let mut schedule = self.lock_schedule();

        if schedule.enabled == enabled {
            debug!(enabled, "Interval trigger already in requested state");
            return;
        }

        schedule.enabled = enabled;
        if enabled {
            self.arm(&mut schedule);
            info!(interval_secs = schedule.interval.as_secs(), "Interval trigger armed");
        } else {
            Self::disarm(&mut schedule);
            info!("Interval trigger disarmed");
        }
    }

    /// Change the interval between ticks
    ///
    /// While armed, the timer is restarted with the new interval and the
    /// elapsed part of the current period is discarded. While disarmed only
    /// the stored value changes.
    ///
    /// # Errors
    /// `InvalidConfiguration` when `secs` is outside the accepted range; the
    /// previous interval is kept.
    pub fn set_interval(&self, secs: u64) -> Result<()> {
        let interval = match validate_interval(secs) {
            Ok(interval) => interval,
            Err(e) => {
                warn!(requested = secs, error = %e, "Rejected interval change");
                return Err(e);
            }
        };

        let mut schedule = self.lock_schedule();

        if schedule.interval == interval {
            debug!(interval_secs = secs, "Interval unchanged");
            return Ok(());
        }

        schedule.interval = interval;
        if schedule.timer.is_some() {
            Self::disarm(&mut schedule);
            self.arm(&mut schedule);
            info!(interval_secs = secs, "Interval changed, timer restarted");
        } else {
            info!(interval_secs = secs, "Interval changed");
        }

        Ok(())
    }

    /// Evaluate the gate and run the action if permitted
    ///
    /// Called by the timer task on every elapsed interval. Never fails.
    pub fn on_tick(&self) -> TickOutcome {
        self.dispatcher.on_tick()
    }

    /// Run the action now, ignoring the gate
    ///
    /// The schedule and phase of the timer are not affected.
    pub fn force_now(&self) -> TickOutcome {
        info!(action = self.dispatcher.action.name(), "Forced run requested");
        self.dispatcher.force()
    }

    /// Disarm the timer for good
    pub fn shutdown(&self) {
        let mut schedule = self.lock_schedule();
        schedule.enabled = false;
        if schedule.timer.is_some() {
            Self::disarm(&mut schedule);
            info!("Interval trigger shut down");
        }
    }

    /// Current interval in seconds
    pub fn interval_secs(&self) -> u64 {
        self.lock_schedule().interval.as_secs()
    }

    /// Whether the trigger is switched on
    pub fn is_enabled(&self) -> bool {
        self.lock_schedule().enabled
    }

    /// Whether a timer task is currently armed
    pub fn is_armed(&self) -> bool {
        self.lock_schedule().timer.is_some()
    }

    /// When the next scheduled tick is due, if armed
    pub fn next_tick_at(&self) -> Option<Instant> {
        let schedule = self.lock_schedule();
        let timer = schedule.timer.as_ref()?;

        let period = schedule.interval.as_nanos();
        let elapsed = Instant::now().saturating_duration_since(timer.armed_at).as_nanos();
        let periods = elapsed / period + 1;
        let offset = u64::try_from(periods * period).unwrap_or(u64::MAX);

        Some(timer.armed_at + Duration::from_nanos(offset))
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> TriggerStats {
        self.dispatcher.lock_stats().clone()
    }

    fn arm(&self, schedule: &mut Schedule) {
        let cancel = CancellationToken::new();
        let period = schedule.interval;
        let armed_at = Instant::now();

        let task = self.runtime.spawn(run_ticks(
            Arc::clone(&self.dispatcher),
            armed_at + period,
            period,
            cancel.clone(),
        ));

        schedule.timer = Some(ArmedTimer {
            cancel,
            armed_at,
            _task: task,
        });
    }

    fn disarm(schedule: &mut Schedule) {
        if let Some(timer) = schedule.timer.take() {
            timer.cancel.cancel();
        }
    }
}

impl Drop for IntervalTrigger {
    fn drop(&mut self) {
        let schedule = self.schedule.get_mut().unwrap_or_else(PoisonError::into_inner);
        Self::disarm(schedule);
    }
}

async fn run_ticks(
    dispatcher: Arc<Dispatcher>,
    first_tick: Instant,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval_at(first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if cancel.is_cancelled() {
                    break;
                }
                dispatcher.on_tick();
            }
        }
    }

    debug!(interval_secs = period.as_secs(), "Timer task stopped");
}
