//! Resolution controller.
//!
//! Runs one encounter on a background tokio task: asks the oracle for each
//! combatant's intent in initiative order, decodes it, resolves it with the
//! rules engine, merges the result, and reports progress to an observer.
//!
//! Lifecycle: `Idle -> Running <-> Paused -> Stopped -> Idle`. In step mode
//! the worker pauses after every turn until [`Controller::resume`] is
//! called. [`Controller::stop`] is cooperative; [`Controller::reset`] waits
//! a bounded grace period for the worker and then clears everything
//! regardless.
//!
//! # Example
//!
//! ```ignore
//! use combat_core::controller::{ChannelObserver, Controller, Mode};
//! use combat_core::dice::RandomDice;
//! use std::sync::Arc;
//!
//! let controller = Controller::new(my_oracle);
//! let (observer, mut events) = ChannelObserver::channel();
//! controller.start(&state, Arc::new(RandomDice::new()), Arc::new(observer), Mode::Continuous)?;
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event.phase());
//! }
//! ```

mod diagnostics;
mod observer;
mod oracle;
mod worker;

pub use diagnostics::{CallGuard, Diagnostics, DiagnosticsSnapshot};
pub use observer::{ChannelObserver, CombatEvent, CombatObserver, Phase};
pub use oracle::{
    ActorView, CombatantView, DecisionOracle, OracleError, RetryingOracle, Situation, TimedStep,
    TimeoutOracle,
};

use crate::dice::DiceRoller;
use crate::rules::RulesEngine;
use crate::state::{CombatState, CombatSummary};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use worker::Worker;

/// Why `start` refused to run an encounter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    #[error("an encounter is already running")]
    AlreadyRunning,
    #[error("encounter has no combatants")]
    NoCombatants,
    #[error("start must be called from within a tokio runtime")]
    NoRuntime,
}

/// How the worker paces turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Run turns back to back with a short yield between them.
    #[default]
    Continuous,
    /// Pause after every turn until resumed.
    Step,
}

// ============================================================================
// Configuration
// ============================================================================

/// Controller tuning.
///
/// Loadable from JSON; durations are given in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Round ceiling before the encounter is called off.
    pub max_rounds: u32,
    /// Continuous-mode pause between turns.
    #[serde(rename = "turn_delay_ms", with = "millis")]
    pub turn_delay: Duration,
    /// How long `reset` waits for the worker to exit.
    #[serde(rename = "reset_grace_ms", with = "millis")]
    pub reset_grace: Duration,
    /// Wall-clock ceiling per oracle call.
    #[serde(rename = "oracle_timeout_ms", with = "millis")]
    pub oracle_timeout: Duration,
    /// Extra attempts after a failed oracle call.
    pub oracle_retries: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_rounds: 50,
            turn_delay: Duration::from_millis(10),
            reset_grace: Duration::from_millis(250),
            oracle_timeout: Duration::from_secs(30),
            oracle_retries: 1,
        }
    }
}

impl ControllerConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = rounds;
        self
    }

    pub fn with_turn_delay(mut self, delay: Duration) -> Self {
        self.turn_delay = delay;
        self
    }

    pub fn with_reset_grace(mut self, grace: Duration) -> Self {
        self.reset_grace = grace;
        self
    }

    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    pub fn with_oracle_retries(mut self, retries: u32) -> Self {
        self.oracle_retries = retries;
        self
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

// ============================================================================
// Shared control state
// ============================================================================

#[derive(Debug, Default)]
pub(crate) struct Flags {
    pub running: bool,
    pub mode: Mode,
    pub paused: bool,
    pub stop_requested: bool,
    /// Bumped by every start and reset so a detached worker can tell it is
    /// stale.
    pub generation: u64,
}

#[derive(Default)]
pub(crate) struct Shared {
    pub flags: Mutex<Flags>,
    pub resume: Notify,
    pub summary: Mutex<Option<CombatSummary>>,
    pub handle: Mutex<Option<JoinHandle<()>>>,
}

/// Lock, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Drives one encounter at a time.
pub struct Controller {
    config: ControllerConfig,
    oracle: Arc<dyn DecisionOracle>,
    engine: RulesEngine,
    diagnostics: Arc<Diagnostics>,
    shared: Arc<Shared>,
}

impl Controller {
    /// Controller with default configuration.
    pub fn new(oracle: impl DecisionOracle + 'static) -> Self {
        Self::with_config(oracle, ControllerConfig::default())
    }

    pub fn with_config(oracle: impl DecisionOracle + 'static, config: ControllerConfig) -> Self {
        Self::with_diagnostics(oracle, config, Arc::new(Diagnostics::new()))
    }

    /// Wraps the oracle in retry and timeout layers, reporting to
    /// `diagnostics`.
    pub fn with_diagnostics(
        oracle: impl DecisionOracle + 'static,
        config: ControllerConfig,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        let retrying = RetryingOracle::new(Arc::new(oracle), config.oracle_retries);
        let oracle = TimeoutOracle::new(Arc::new(retrying), config.oracle_timeout)
            .with_diagnostics(diagnostics.clone());
        Self {
            config,
            oracle: Arc::new(oracle),
            engine: RulesEngine::new(),
            diagnostics,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Swap the rules engine, e.g. for a different mechanics fallback.
    pub fn with_rules(mut self, engine: RulesEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> Arc<Diagnostics> {
        self.diagnostics.clone()
    }

    /// Start resolving `state` in the background.
    ///
    /// The state is copied; the caller's value is never read again. Must be
    /// called inside a tokio runtime. On failure the observer also receives
    /// an `Error` notification.
    pub fn start(
        &self,
        state: &CombatState,
        dice: Arc<dyn DiceRoller>,
        observer: Arc<dyn CombatObserver>,
        mode: Mode,
    ) -> Result<(), StartError> {
        let result = self.try_start(state, dice, observer.clone(), mode);
        if let Err(e) = &result {
            tracing::warn!(error = %e, "start rejected");
            observer::publish(&*observer, state, Phase::Error, Some(&e.to_string()));
        }
        result
    }

    fn try_start(
        &self,
        state: &CombatState,
        dice: Arc<dyn DiceRoller>,
        observer: Arc<dyn CombatObserver>,
        mode: Mode,
    ) -> Result<(), StartError> {
        if state.combatants.is_empty() {
            return Err(StartError::NoCombatants);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| StartError::NoRuntime)?;

        let generation = {
            let mut flags = lock(&self.shared.flags);
            if flags.running {
                return Err(StartError::AlreadyRunning);
            }
            flags.running = true;
            flags.paused = false;
            flags.stop_requested = false;
            flags.mode = mode;
            flags.generation += 1;
            flags.generation
        };
        *lock(&self.shared.summary) = None;

        let worker = Worker {
            state: state.clone(),
            dice,
            observer,
            oracle: self.oracle.clone(),
            engine: self.engine.clone(),
            timed: TimedStep::new(self.diagnostics.clone()),
            diagnostics: self.diagnostics.clone(),
            config: self.config.clone(),
            shared: self.shared.clone(),
            generation,
        };
        let handle = runtime.spawn(worker.run());
        *lock(&self.shared.handle) = Some(handle);
        tracing::info!(combatants = state.combatants.len(), ?mode, generation, "encounter started");
        Ok(())
    }

    /// Wake a paused worker. Returns false when it was not paused.
    pub fn resume(&self) -> bool {
        {
            let mut flags = lock(&self.shared.flags);
            if !flags.paused {
                return false;
            }
            flags.paused = false;
        }
        self.shared.resume.notify_waiters();
        true
    }

    /// Ask the worker to stop at its next checkpoint.
    pub fn stop(&self) {
        {
            let mut flags = lock(&self.shared.flags);
            if !flags.running {
                return;
            }
            flags.stop_requested = true;
        }
        self.shared.resume.notify_waiters();
    }

    /// Stop, wait up to the configured grace period, then clear all state.
    ///
    /// A worker that does not exit in time is detached; it notices it is
    /// stale at its next checkpoint and exits without touching the
    /// controller.
    pub async fn reset(&self) {
        lock(&self.shared.flags).stop_requested = true;
        self.shared.resume.notify_waiters();

        let handle = lock(&self.shared.handle).take();
        if let Some(handle) = handle {
            if tokio::time::timeout(self.config.reset_grace, handle).await.is_err() {
                tracing::warn!(grace = ?self.config.reset_grace, "worker still running after grace period, detaching");
            }
        }

        {
            let mut flags = lock(&self.shared.flags);
            let generation = flags.generation + 1;
            *flags = Flags {
                generation,
                ..Flags::default()
            };
        }
        *lock(&self.shared.summary) = None;
    }

    /// Wait for the current worker to finish on its own.
    pub async fn join(&self) {
        let handle = lock(&self.shared.handle).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "combat worker ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.shared.flags).running
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.shared.flags).paused
    }

    pub fn mode(&self) -> Mode {
        lock(&self.shared.flags).mode
    }

    /// Switch pacing mid-encounter. Switching to continuous also resumes.
    pub fn set_mode(&self, mode: Mode) {
        lock(&self.shared.flags).mode = mode;
        if mode == Mode::Continuous {
            self.resume();
        }
    }

    /// The last finished encounter's summary, if any.
    pub fn summary(&self) -> Option<CombatSummary> {
        lock(&self.shared.summary).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.max_rounds, 50);
        assert_eq!(config.turn_delay, Duration::from_millis(10));
        assert_eq!(config.oracle_retries, 1);
    }

    #[test]
    fn test_config_from_json() {
        let config =
            ControllerConfig::from_json(r#"{"max_rounds": 5, "oracle_timeout_ms": 1500}"#).unwrap();
        assert_eq!(config.max_rounds, 5);
        assert_eq!(config.oracle_timeout, Duration::from_millis(1500));
        assert_eq!(config.reset_grace, Duration::from_millis(250));
    }

    #[test]
    fn test_config_builders() {
        let config = ControllerConfig::default()
            .with_max_rounds(3)
            .with_turn_delay(Duration::ZERO)
            .with_oracle_retries(0);
        assert_eq!(config.max_rounds, 3);
        assert_eq!(config.turn_delay, Duration::ZERO);
        assert_eq!(config.oracle_retries, 0);
    }
}
