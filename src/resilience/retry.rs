//! Retry policy with capped exponential backoff.
//!
//! The policy only answers two questions for the enclosing request loop:
//! should this failure be retried, and how long to wait first. It never
//! sleeps or re-invokes anything itself.

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retries for one logical operation
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any computed delay
    pub max_delay: Duration,
    /// Multiplier applied per attempt
    pub backoff_factor: f64,
    /// Response statuses that justify a retry
    pub retryable_statuses: BTreeSet<u16>,
    /// Stretch computed delays by a random 0-25%
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: crate::DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            retryable_statuses: crate::DEFAULT_RETRYABLE_STATUSES.into_iter().collect(),
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum retries
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set base delay
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set maximum delay
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Replace the set of retryable statuses
    pub fn retryable_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_statuses = statuses.into_iter().collect();
        self
    }

    /// Enable or disable jitter
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Creates a configuration with no retries
    pub fn no_retries() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Check the configuration for values the policy cannot honor
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(ConfigurationError::InvalidBackoffFactor(
                self.backoff_factor.to_string(),
            ));
        }
        if self.base_delay > self.max_delay {
            return Err(ConfigurationError::InvalidConfiguration {
                message: format!(
                    "base delay {:?} exceeds max delay {:?}",
                    self.base_delay, self.max_delay
                ),
            });
        }
        Ok(())
    }
}

/// Stateless retry decisions over an immutable [`RetryConfig`]
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Creates a new retry policy
    ///
    /// The configuration is taken as is; use [`RetryPolicy::try_new`] for
    /// configuration from an untrusted source.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Creates a retry policy after validating `config`
    pub fn try_new(config: RetryConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get the policy configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Decide whether a failed call should be retried
    ///
    /// `status` is `None` when no response arrived at all; connectivity
    /// failures are always retryable within the attempt budget. `attempt`
    /// counts retries already made, starting at zero.
    pub fn should_retry(&self, status: Option<u16>, attempt: u32) -> bool {
        if attempt >= self.config.max_attempts {
            return false;
        }
        match status {
            None => true,
            Some(code) => self.config.retryable_statuses.contains(&code),
        }
    }

    /// Whether the attempt budget is spent, regardless of status
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.config.max_attempts
    }

    /// Delay before retry number `attempt` (zero-based)
    ///
    /// A remote hint within `max_delay` wins outright. Otherwise the delay is
    /// `base_delay * backoff_factor^attempt`, capped at `max_delay`.
    pub fn get_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            if hint <= self.config.max_delay {
                return hint;
            }
        }

        let backoff = self.backoff(attempt);
        if self.config.jitter {
            let stretch = 1.0 + rand::random::<f64>() * 0.25;
            self.clamp_nanos(backoff.as_nanos() as f64 * stretch)
        } else {
            backoff
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let nanos = self.config.base_delay.as_nanos() as f64 * self.config.backoff_factor.powi(exponent);
        self.clamp_nanos(nanos)
    }

    fn clamp_nanos(&self, nanos: f64) -> Duration {
        let max = self.config.max_delay;
        if !nanos.is_finite() || nanos >= max.as_nanos() as f64 {
            return max;
        }
        Duration::from_nanos(nanos.max(0.0) as u64)
    }
}
