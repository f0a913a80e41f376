//! Progress notifications out of the worker.

use crate::state::{CombatState, CombatSummary};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::mpsc;

/// Why an observer is being notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    TurnComplete,
    RoundComplete,
    Paused,
    Stopped,
    CombatEnded,
    Error,
}

/// Receives a snapshot after every turn, round transition, pause, stop, and
/// terminal event.
///
/// Called on the worker task, so implementations must not block. A panic is
/// caught and logged, never retried.
pub trait CombatObserver: Send + Sync {
    fn notify(&self, snapshot: &CombatState, phase: Phase, error: Option<&str>);

    /// Delivered once, just before the `CombatEnded` notification.
    fn summary(&self, _summary: &CombatSummary) {}
}

impl<F> CombatObserver for F
where
    F: Fn(&CombatState, Phase, Option<&str>) + Send + Sync,
{
    fn notify(&self, snapshot: &CombatState, phase: Phase, error: Option<&str>) {
        self(snapshot, phase, error)
    }
}

/// An observer notification as an owned value.
#[derive(Debug, Clone, PartialEq)]
pub enum CombatEvent {
    Update {
        phase: Phase,
        snapshot: Box<CombatState>,
        error: Option<String>,
    },
    Summary(Box<CombatSummary>),
}

impl CombatEvent {
    pub fn phase(&self) -> Phase {
        match self {
            CombatEvent::Update { phase, .. } => *phase,
            CombatEvent::Summary(_) => Phase::CombatEnded,
        }
    }
}

/// Forwards notifications over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<CombatEvent>,
}

impl ChannelObserver {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CombatEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl CombatObserver for ChannelObserver {
    fn notify(&self, snapshot: &CombatState, phase: Phase, error: Option<&str>) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.tx.send(CombatEvent::Update {
            phase,
            snapshot: Box::new(snapshot.clone()),
            error: error.map(str::to_string),
        });
    }

    fn summary(&self, summary: &CombatSummary) {
        let _ = self.tx.send(CombatEvent::Summary(Box::new(summary.clone())));
    }
}

/// Notify without letting an observer panic escape.
pub(crate) fn publish(
    observer: &dyn CombatObserver,
    snapshot: &CombatState,
    phase: Phase,
    error: Option<&str>,
) {
    if catch_unwind(AssertUnwindSafe(|| observer.notify(snapshot, phase, error))).is_err() {
        tracing::warn!(?phase, "observer panicked, notification dropped");
    }
}

pub(crate) fn publish_summary(observer: &dyn CombatObserver, summary: &CombatSummary) {
    if catch_unwind(AssertUnwindSafe(|| observer.summary(summary))).is_err() {
        tracing::warn!("observer panicked on summary, notification dropped");
    }
}
