//! Admission gate: token bucket with a remote-driven cooldown window.
//!
//! Two independent signals feed the gate. Local exhaustion (no permits left
//! in the bucket) clears on the next refill tick. Remote throttling (an
//! explicit overload response) opens a cooldown window during which nothing
//! is admitted, whatever the bucket holds.
//!
//! Refill is lazy: every operation credits `floor(elapsed / refill_interval)`
//! permits and moves the refill mark to "now", discarding the sub-interval
//! remainder.

use crate::clock::{Clock, TokioClock};
use crate::errors::{AdmissionError, AdmissionResult, ConfigurationError};
use crate::observability::{GateMetrics, GateMetricsSnapshot};
use crate::response::retry_after_from_headers;
use http::HeaderMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Longest cooldown the gate will honor, whatever the remote asks for
pub const MAX_COOLDOWN: Duration = Duration::from_secs(86400 * 365 * 30);

/// Configuration for the admission gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Maximum permits held at once
    pub capacity: u32,
    /// Time after which one permit is restored
    pub refill_interval: Duration,
    /// Cooldown applied when the remote gives no retry-after hint
    pub default_cooldown: Duration,
    /// Response statuses treated as an explicit overload signal
    pub throttle_statuses: BTreeSet<u16>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            capacity: crate::DEFAULT_CAPACITY,
            refill_interval: Duration::from_millis(crate::DEFAULT_REFILL_INTERVAL_MS),
            default_cooldown: Duration::from_secs(crate::DEFAULT_COOLDOWN_SECS),
            throttle_statuses: crate::DEFAULT_THROTTLE_STATUSES.into_iter().collect(),
        }
    }
}

impl GateConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the permit capacity
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the refill interval
    pub fn refill_interval(mut self, interval: Duration) -> Self {
        self.refill_interval = interval;
        self
    }

    /// Set the fallback cooldown
    pub fn default_cooldown(mut self, cooldown: Duration) -> Self {
        self.default_cooldown = cooldown;
        self
    }

    /// Replace the set of overload statuses
    pub fn throttle_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.throttle_statuses = statuses.into_iter().collect();
        self
    }

    /// Check the configuration for values the gate cannot honor
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.capacity == 0 {
            return Err(ConfigurationError::ZeroCapacity);
        }
        if self.refill_interval.is_zero() {
            return Err(ConfigurationError::ZeroRefillInterval);
        }
        Ok(())
    }

    /// Create config matching a per-minute request quota
    pub fn per_minute(requests: u32) -> Self {
        let interval = Duration::from_secs(60) / requests.max(1);
        Self::default().capacity(requests).refill_interval(interval)
    }
}

/// Snapshot of gate state for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateStatus {
    /// Permits currently available
    pub available: u32,
    /// Maximum permits
    pub capacity: u32,
    /// End of the active cooldown, if any
    pub cooldown_until: Option<Instant>,
}

impl GateStatus {
    /// Time left in the cooldown as seen from `now`
    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        self.cooldown_until
            .filter(|until| now < *until)
            .map(|until| until - now)
    }
}

/// Mutable bucket state, only touched under the gate's mutex
#[derive(Debug)]
struct BucketState {
    available: u32,
    last_refill: Instant,
    cooldown_until: Option<Instant>,
}

impl BucketState {
    fn refill(&mut self, now: Instant, config: &GateConfig) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed < config.refill_interval {
            return;
        }

        let whole = elapsed.as_nanos() / config.refill_interval.as_nanos();
        let credited = u32::try_from(whole).unwrap_or(u32::MAX);
        self.available = self.available.saturating_add(credited).min(config.capacity);
        self.last_refill = now;
    }

    /// Remaining cooldown; forgets the window once it has passed.
    fn active_cooldown(&mut self, now: Instant) -> Option<Duration> {
        match self.cooldown_until {
            Some(until) if now < until => Some(until - now),
            Some(_) => {
                self.cooldown_until = None;
                None
            }
            None => None,
        }
    }

    fn until_next_refill(&self, now: Instant, config: &GateConfig) -> Duration {
        (self.last_refill + config.refill_interval).saturating_duration_since(now)
    }
}

/// Outcome of one admission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Granted,
    CoolingDown(Duration),
    Exhausted(Duration),
}

/// Token-bucket admission gate with a cooldown window
///
/// Shared between tasks behind an `Arc`. All state transitions happen under
/// a single mutex which is never held across a suspension point.
pub struct AdmissionGate {
    config: GateConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<BucketState>,
    metrics: GateMetrics,
}

impl AdmissionGate {
    /// Create a gate reading time from the tokio clock
    pub fn new(config: GateConfig) -> AdmissionResult<Self> {
        Self::with_clock(config, Arc::new(TokioClock))
    }

    /// Create a gate with a custom time source
    pub fn with_clock(config: GateConfig, clock: Arc<dyn Clock>) -> AdmissionResult<Self> {
        config.validate()?;

        let state = BucketState {
            available: config.capacity,
            last_refill: clock.now(),
            cooldown_until: None,
        };

        Ok(Self {
            config,
            clock,
            state: Mutex::new(state),
            metrics: GateMetrics::new(),
        })
    }

    /// Get the gate configuration
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Wait for a permit
    ///
    /// Suspends while a cooldown is active or the bucket is empty. Returns
    /// [`AdmissionError::Cancelled`] as soon as `cancel` fires; an
    /// already-cancelled token never consumes a permit.
    #[instrument(skip(self, cancel), level = "debug")]
    pub async fn acquire(&self, cancel: &CancellationToken) -> AdmissionResult<()> {
        loop {
            if cancel.is_cancelled() {
                self.metrics.record_cancelled();
                return Err(AdmissionError::Cancelled);
            }

            let wait = match self.decide() {
                Decision::Granted => {
                    self.metrics.record_granted();
                    return Ok(());
                }
                Decision::CoolingDown(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "Waiting out cooldown");
                    wait
                }
                Decision::Exhausted(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "Waiting for permit refill");
                    wait
                }
            };

            self.metrics.record_wait();

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    self.metrics.record_cancelled();
                    debug!("Permit acquisition cancelled");
                    return Err(AdmissionError::Cancelled);
                }
                () = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Wait for a permit, giving up after `timeout`
    ///
    /// A missed deadline is reported as [`AdmissionError::Cancelled`].
    pub async fn acquire_timeout(
        &self,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> AdmissionResult<()> {
        match tokio::time::timeout(timeout, self.acquire(cancel)).await {
            Ok(result) => result,
            Err(_) => {
                self.metrics.record_cancelled();
                debug!(timeout_ms = timeout.as_millis() as u64, "Permit deadline elapsed");
                Err(AdmissionError::Cancelled)
            }
        }
    }

    /// Take a permit if one is available right now
    pub fn try_acquire(&self) -> bool {
        let granted = self.decide() == Decision::Granted;
        if granted {
            self.metrics.record_granted();
        } else {
            self.metrics.record_denied();
        }
        granted
    }

    /// Enter a cooldown after an explicit overload signal
    ///
    /// Uses the gate's configured default cooldown when no hint is given.
    pub fn report_throttled(&self, retry_after: Option<Duration>) -> AdmissionError {
        self.enter_cooldown(None, retry_after, self.config.default_cooldown)
    }

    /// Enter a cooldown of `retry_after`, or `default_cooldown` without a hint
    ///
    /// Drains the bucket; the refill mark is left alone, so accounting
    /// resumes on its usual cadence once the cooldown ends.
    pub fn report_throttled_with_default(
        &self,
        retry_after: Option<Duration>,
        default_cooldown: Duration,
    ) -> AdmissionError {
        self.enter_cooldown(None, retry_after, default_cooldown)
    }

    /// Enter a cooldown after the remote answered with overload `status`
    ///
    /// The status is carried in the returned error.
    pub fn report_throttled_response(
        &self,
        status: u16,
        retry_after: Option<Duration>,
    ) -> AdmissionError {
        self.enter_cooldown(Some(status), retry_after, self.config.default_cooldown)
    }

    /// Update state from a completed response
    ///
    /// Returns the throttling error when `status` is an overload signal.
    pub fn observe_response(&self, status: u16, headers: &HeaderMap) -> Option<AdmissionError> {
        if !self.is_throttle_status(status) {
            return None;
        }
        Some(self.report_throttled_response(status, retry_after_from_headers(headers)))
    }

    /// Check whether `status` counts as an overload signal
    pub fn is_throttle_status(&self, status: u16) -> bool {
        self.config.throttle_statuses.contains(&status)
    }

    /// Snapshot of the current state, after applying refill
    pub fn status(&self) -> GateStatus {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.refill(now, &self.config);
        state.active_cooldown(now);

        GateStatus {
            available: state.available,
            capacity: self.config.capacity,
            cooldown_until: state.cooldown_until,
        }
    }

    /// Get gate counters
    pub fn metrics(&self) -> GateMetricsSnapshot {
        self.metrics.snapshot()
    }

    fn enter_cooldown(
        &self,
        status: Option<u16>,
        retry_after: Option<Duration>,
        default_cooldown: Duration,
    ) -> AdmissionError {
        // Remote hints are untrusted; the clamp keeps `now + cooldown` in range.
        let cooldown = retry_after.unwrap_or(default_cooldown).min(MAX_COOLDOWN);
        let until = self.clock.now() + cooldown;

        {
            let mut state = self.state.lock();
            state.cooldown_until = Some(until);
            state.available = 0;
        }

        self.metrics.record_throttled();
        warn!(
            cooldown_ms = cooldown.as_millis() as u64,
            hinted = retry_after.is_some(),
            status,
            "Remote signalled overload, entering cooldown"
        );

        AdmissionError::Throttled {
            retry_after: cooldown,
            until,
            status,
        }
    }

    fn decide(&self) -> Decision {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if let Some(wait) = state.active_cooldown(now) {
            return Decision::CoolingDown(wait);
        }

        state.refill(now, &self.config);

        if state.available > 0 {
            state.available -= 1;
            Decision::Granted
        } else {
            Decision::Exhausted(state.until_next_refill(now, &self.config))
        }
    }
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("config", &self.config)
            .field("status", &self.status())
            .finish()
    }
}
