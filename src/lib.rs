//! Outbound-call admission control
//!
//! Admission control for clients of a remote API with a hard, externally
//! enforced rate limit:
//! - Token-bucket admission gate with lazy whole-interval refill
//! - Cooldown window driven by explicit overload responses (`429` + `Retry-After`)
//! - Stateless retry policy with capped exponential backoff
//! - Request orchestrator composing both into a cancellable retry loop
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use admission_control::{AdmissionConfig, FailedCall, RequestOrchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = RequestOrchestrator::new(AdmissionConfig::builder().build()?)?;
//!     let cancel = CancellationToken::new();
//!
//!     let body = orchestrator
//!         .execute(&cancel, || async {
//!             // Issue the HTTP call here; map failures into `FailedCall`.
//!             Ok::<_, FailedCall>("{}")
//!         })
//!         .await?;
//!
//!     println!("{body}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;
pub mod response;

// Resilience
pub mod resilience;

// Observability
pub mod observability;

// Tests
#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::{AdmissionConfig, AdmissionConfigBuilder, GateConfig, RetryConfig};
pub use errors::{AdmissionError, AdmissionResult, ConfigurationError};
pub use resilience::{AdmissionGate, FailedCall, GateStatus, RequestOrchestrator, RetryPolicy};

/// Default permit capacity of the admission gate
pub const DEFAULT_CAPACITY: u32 = 100;

/// Default interval after which one permit is restored, in milliseconds
pub const DEFAULT_REFILL_INTERVAL_MS: u64 = 600;

/// Default cooldown when the remote omits a retry-after hint, in seconds
pub const DEFAULT_COOLDOWN_SECS: u64 = 60;

/// Default maximum retries for one logical operation
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Response statuses retried by default
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Response statuses treated as an explicit overload signal by default
pub const DEFAULT_THROTTLE_STATUSES: [u16; 1] = [429];
