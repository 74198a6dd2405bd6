//! Configuration management for admission control.
//!
//! Supports configuration via:
//! - Explicit values
//! - Builder pattern
//! - Deserialization from an application's own config file (serde)

use crate::errors::AdmissionResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use crate::resilience::gate::GateConfig;
pub use crate::resilience::retry::RetryConfig;

/// Configuration for one admission controller (gate + retry policy)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Admission gate configuration
    pub gate: GateConfig,
    /// Retry policy configuration
    pub retry: RetryConfig,
}

impl AdmissionConfig {
    /// Create a new configuration builder
    pub fn builder() -> AdmissionConfigBuilder {
        AdmissionConfigBuilder::new()
    }

    /// Validate both halves of the configuration
    pub fn validate(&self) -> AdmissionResult<()> {
        self.gate.validate()?;
        self.retry.validate()?;
        Ok(())
    }
}

/// Builder for [`AdmissionConfig`]
#[derive(Debug, Clone, Default)]
pub struct AdmissionConfigBuilder {
    config: AdmissionConfig,
}

impl AdmissionConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the gate configuration wholesale
    pub fn gate(mut self, gate: GateConfig) -> Self {
        self.config.gate = gate;
        self
    }

    /// Set the retry configuration wholesale
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set the permit capacity
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.config.gate.capacity = capacity;
        self
    }

    /// Set the refill interval
    pub fn refill_interval(mut self, interval: Duration) -> Self {
        self.config.gate.refill_interval = interval;
        self
    }

    /// Set the cooldown used when the remote gives no retry-after hint
    pub fn default_cooldown(mut self, cooldown: Duration) -> Self {
        self.config.gate.default_cooldown = cooldown;
        self
    }

    /// Set maximum retry attempts
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.retry.max_attempts = n;
        self
    }

    /// Set the first backoff delay
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.retry.base_delay = delay;
        self
    }

    /// Set the backoff cap
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.retry.max_delay = delay;
        self
    }

    /// Set the backoff multiplier
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.config.retry.backoff_factor = factor;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> AdmissionResult<AdmissionConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{AdmissionError, ConfigurationError};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = AdmissionConfig::default();
        assert_eq!(config.gate.capacity, crate::DEFAULT_CAPACITY);
        assert_eq!(
            config.gate.refill_interval,
            Duration::from_millis(crate::DEFAULT_REFILL_INTERVAL_MS)
        );
        assert_eq!(
            config.gate.default_cooldown,
            Duration::from_secs(crate::DEFAULT_COOLDOWN_SECS)
        );
        assert_eq!(config.retry.max_attempts, crate::DEFAULT_MAX_ATTEMPTS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = AdmissionConfig::builder()
            .capacity(10)
            .refill_interval(Duration::from_millis(100))
            .default_cooldown(Duration::from_secs(5))
            .max_attempts(5)
            .base_delay(Duration::from_millis(200))
            .max_delay(Duration::from_secs(10))
            .backoff_factor(3.0)
            .build()
            .unwrap();

        assert_eq!(config.gate.capacity, 10);
        assert_eq!(config.gate.refill_interval, Duration::from_millis(100));
        assert_eq!(config.gate.default_cooldown, Duration::from_secs(5));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(200));
        assert_eq!(config.retry.max_delay, Duration::from_secs(10));
        assert_eq!(config.retry.backoff_factor, 3.0);
    }

    #[test]
    fn test_builder_rejects_zero_capacity() {
        let result = AdmissionConfig::builder().capacity(0).build();
        assert!(matches!(
            result,
            Err(AdmissionError::Configuration(ConfigurationError::ZeroCapacity))
        ));
    }

    #[test]
    fn test_builder_rejects_inverted_delays() {
        let result = AdmissionConfig::builder()
            .base_delay(Duration::from_secs(10))
            .max_delay(Duration::from_secs(1))
            .build();
        assert!(matches!(
            result,
            Err(AdmissionError::Configuration(
                ConfigurationError::InvalidConfiguration { .. }
            ))
        ));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let json = r#"{
            "gate": { "capacity": 20 },
            "retry": { "max_attempts": 6, "retryable_statuses": [429, 503] }
        }"#;

        let config: AdmissionConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.gate.capacity, 20);
        assert_eq!(
            config.gate.refill_interval,
            Duration::from_millis(crate::DEFAULT_REFILL_INTERVAL_MS)
        );
        assert_eq!(config.retry.max_attempts, 6);
        assert_eq!(
            config.retry.retryable_statuses.iter().copied().collect::<Vec<_>>(),
            vec![429, 503]
        );
        assert!(config.validate().is_ok());
    }
}
