//! Per-controller counters for oracle calls and degraded turns.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Counters shared between a controller and its worker.
#[derive(Debug, Default)]
pub struct Diagnostics {
    active_calls: AtomicUsize,
    completed_calls: AtomicU64,
    failed_calls: AtomicU64,
    timeouts: AtomicU64,
    decode_fallbacks: AtomicU64,
    turn_panics: AtomicU64,
    call_micros: AtomicU64,
}

/// Point-in-time copy of [`Diagnostics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSnapshot {
    pub active_calls: usize,
    pub completed_calls: u64,
    pub failed_calls: u64,
    pub timeouts: u64,
    pub decode_fallbacks: u64,
    pub turn_panics: u64,
    pub total_call_time: Duration,
}

impl DiagnosticsSnapshot {
    pub fn mean_call_time(&self) -> Option<Duration> {
        let calls = u32::try_from(self.completed_calls).ok().filter(|n| *n > 0)?;
        Some(self.total_call_time / calls)
    }
}

/// Marks an oracle call in flight until dropped.
pub struct CallGuard<'a> {
    diagnostics: &'a Diagnostics,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.diagnostics.active_calls.fetch_sub(1, Ordering::Relaxed);
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_started(&self) -> CallGuard<'_> {
        self.active_calls.fetch_add(1, Ordering::Relaxed);
        CallGuard { diagnostics: self }
    }

    pub fn record_call(&self, elapsed: Duration, succeeded: bool) {
        self.completed_calls.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.call_micros.fetch_add(micros, Ordering::Relaxed);
        if !succeeded {
            self.failed_calls.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_fallback(&self) {
        self.decode_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_turn_panic(&self) {
        self.turn_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            active_calls: self.active_calls.load(Ordering::Relaxed),
            completed_calls: self.completed_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            decode_fallbacks: self.decode_fallbacks.load(Ordering::Relaxed),
            turn_panics: self.turn_panics.load(Ordering::Relaxed),
            total_call_time: Duration::from_micros(self.call_micros.load(Ordering::Relaxed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let diagnostics = Diagnostics::new();
        {
            let _guard = diagnostics.call_started();
            assert_eq!(diagnostics.snapshot().active_calls, 1);
            diagnostics.record_call(Duration::from_millis(4), true);
        }
        diagnostics.record_call(Duration::from_millis(2), false);
        diagnostics.record_decode_fallback();

        let snapshot = diagnostics.snapshot();
        assert_eq!(snapshot.active_calls, 0);
        assert_eq!(snapshot.completed_calls, 2);
        assert_eq!(snapshot.failed_calls, 1);
        assert_eq!(snapshot.decode_fallbacks, 1);
        assert_eq!(snapshot.mean_call_time(), Some(Duration::from_millis(3)));
    }

    #[test]
    fn test_mean_with_no_calls() {
        assert_eq!(Diagnostics::new().snapshot().mean_call_time(), None);
    }
}
