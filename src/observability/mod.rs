//! Observability infrastructure for admission control.
//!
//! Structured logging goes through `tracing` at the call sites; this module
//! holds the counters exposed by the gate.

pub mod metrics;

pub use metrics::*;
