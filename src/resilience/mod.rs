//! Resilience patterns for outbound calls.
//!
//! Provides the admission gate, the retry policy, and the orchestrator that
//! composes them into a request loop.

pub mod gate;
pub mod orchestrator;
pub mod retry;

pub use gate::{AdmissionGate, GateConfig, GateStatus, MAX_COOLDOWN};
pub use orchestrator::{FailedCall, RequestOrchestrator};
pub use retry::{RetryConfig, RetryPolicy};
