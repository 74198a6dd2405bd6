//! Time source abstraction for the admission gate.
//!
//! The gate reads "now" through [`Clock`] so refill and cooldown accounting
//! can be driven deterministically. Suspension always goes through tokio
//! timers, so a clock used with [`AdmissionGate::acquire`] must advance with
//! the tokio clock.
//!
//! [`AdmissionGate::acquire`]: crate::resilience::AdmissionGate::acquire

use parking_lot::Mutex;
use std::fmt::Debug;
use std::time::Duration;
use tokio::time::Instant;

/// Source of the current instant
pub trait Clock: Debug + Send + Sync {
    /// Returns the current instant
    fn now(&self) -> Instant;
}

/// Clock delegating to `tokio::time::Instant::now()`
///
/// Honors a paused tokio clock, so `tokio::time::advance` moves it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
///
/// Intended for exercising the non-suspending gate operations
/// (`try_acquire`, `report_throttled`, `status`).
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    /// Create a clock frozen at the current instant
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Create a clock frozen at `start`
    pub fn starting_at(start: Instant) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}
