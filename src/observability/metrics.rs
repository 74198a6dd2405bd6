//! Counters for admission gate activity.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters recorded by an [`AdmissionGate`](crate::AdmissionGate)
#[derive(Debug, Default)]
pub struct GateMetrics {
    granted: AtomicU64,
    denied: AtomicU64,
    waits: AtomicU64,
    cancelled: AtomicU64,
    throttled: AtomicU64,
}

impl GateMetrics {
    /// Create a zeroed set of counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a permit handed out
    pub fn record_granted(&self) {
        self.granted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a non-blocking request turned away
    pub fn record_denied(&self) {
        self.denied.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a suspension inside `acquire`
    pub fn record_wait(&self) {
        self.waits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an acquisition abandoned through cancellation or deadline
    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an overload signal from the remote
    pub fn record_throttled(&self) {
        self.throttled.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters
    pub fn snapshot(&self) -> GateMetricsSnapshot {
        GateMetricsSnapshot {
            granted: self.granted.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            waits: self.waits.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`GateMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateMetricsSnapshot {
    /// Permits granted by `acquire` or `try_acquire`
    pub granted: u64,
    /// `try_acquire` calls that were refused
    pub denied: u64,
    /// Times `acquire` suspended
    pub waits: u64,
    /// Acquisitions ended by cancellation or deadline
    pub cancelled: u64,
    /// Overload signals reported
    pub throttled: u64,
}

impl GateMetricsSnapshot {
    /// Share of admission decisions that were refusals
    pub fn denial_rate(&self) -> f64 {
        let attempts = self.granted + self.denied;
        if attempts == 0 {
            0.0
        } else {
            self.denied as f64 / attempts as f64
        }
    }
}
