//! Request orchestrator combining the admission gate and retry policy.
//!
//! This is the enclosing request loop: acquire a permit, run the call, feed
//! overload responses back into the gate, and consult the policy before
//! trying again.

use super::{AdmissionGate, RetryPolicy};
use crate::config::AdmissionConfig;
use crate::errors::{AdmissionError, AdmissionResult, BoxError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// A failed outbound call as seen by the retry loop
#[derive(Debug)]
pub struct FailedCall {
    /// Response status; `None` when no response was received
    pub status: Option<u16>,
    /// Remote-supplied retry-after hint
    pub retry_after: Option<Duration>,
    /// Underlying error
    pub source: BoxError,
}

impl FailedCall {
    /// A call that produced an error response
    pub fn status(
        status: u16,
        retry_after: Option<Duration>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self {
            status: Some(status),
            retry_after,
            source: source.into(),
        }
    }

    /// A call that never got a response (connect, DNS, timeout, ...)
    pub fn transport(source: impl Into<BoxError>) -> Self {
        Self {
            status: None,
            retry_after: None,
            source: source.into(),
        }
    }
}

impl std::fmt::Display for FailedCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.source),
            None => write!(f, "transport failure: {}", self.source),
        }
    }
}

/// Orchestrator running calls through the gate and retry policy
#[derive(Debug, Clone)]
pub struct RequestOrchestrator {
    gate: Arc<AdmissionGate>,
    policy: RetryPolicy,
}

impl RequestOrchestrator {
    /// Create an orchestrator with its own gate
    pub fn new(config: AdmissionConfig) -> AdmissionResult<Self> {
        config.validate()?;
        let gate = Arc::new(AdmissionGate::new(config.gate)?);
        Self::with_gate(gate, RetryPolicy::new(config.retry))
    }

    /// Create an orchestrator over a shared gate
    ///
    /// Several orchestrators (for example one per resource wrapper) can share
    /// a gate when they talk to the same rate-limited remote. The policy's
    /// configuration is validated here.
    pub fn with_gate(gate: Arc<AdmissionGate>, policy: RetryPolicy) -> AdmissionResult<Self> {
        policy.config().validate()?;
        Ok(Self { gate, policy })
    }

    /// Get the admission gate
    pub fn gate(&self) -> &Arc<AdmissionGate> {
        &self.gate
    }

    /// Get the retry policy
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute an operation with admission control and retries
    ///
    /// Each attempt waits for a permit first. Overload responses put the
    /// gate into cooldown before the retry decision is made.
    #[instrument(skip(self, cancel, operation), fields(max_attempts = self.policy.config().max_attempts))]
    pub async fn execute<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        operation: F,
    ) -> AdmissionResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, FailedCall>>,
    {
        let mut attempt = 0;

        loop {
            self.gate.acquire(cancel).await?;

            let failure = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            if let Some(status) = failure.status {
                if self.gate.is_throttle_status(status) {
                    let throttled = self
                        .gate
                        .report_throttled_response(status, failure.retry_after);
                    debug!(error = %throttled, "Gate cooling down");
                }
            }

            if !self.policy.should_retry(failure.status, attempt) {
                return Err(self.give_up(attempt, failure));
            }

            let delay = self.policy.get_delay(attempt, failure.retry_after);
            debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "Retrying after failure"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(AdmissionError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }

    fn give_up(&self, attempt: u32, failure: FailedCall) -> AdmissionError {
        match failure.status {
            Some(status) if !self.policy.is_exhausted(attempt) => {
                warn!(status, error = %failure.source, "Request failed with non-retryable status");
                AdmissionError::Rejected {
                    status,
                    source: failure.source,
                }
            }
            last_status => {
                let attempts = attempt + 1;
                warn!(
                    attempts,
                    last_status,
                    error = %failure.source,
                    "Retries exhausted"
                );
                AdmissionError::RetriesExhausted {
                    attempts,
                    last_status,
                    source: failure.source,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GateConfig, RetryConfig};
    use crate::errors::ConfigurationError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn orchestrator(max_attempts: u32) -> RequestOrchestrator {
        let config = AdmissionConfig::builder()
            .gate(GateConfig::new().capacity(10).refill_interval(Duration::from_millis(10)))
            .retry(
                RetryConfig::new()
                    .max_attempts(max_attempts)
                    .base_delay(Duration::from_millis(10))
                    .max_delay(Duration::from_secs(1)),
            )
            .build()
            .unwrap();
        RequestOrchestrator::new(config).unwrap()
    }

    fn io_error(message: &str) -> std::io::Error {
        std::io::Error::other(message.to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn test_orchestrator_success() {
        let orchestrator = orchestrator(3);
        let cancel = CancellationToken::new();

        let result = orchestrator
            .execute(&cancel, || async { Ok::<_, FailedCall>("success") })
            .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(orchestrator.gate().metrics().granted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_orchestrator_retry() {
        let orchestrator = orchestrator(3);
        let cancel = CancellationToken::new();
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = orchestrator
            .execute(&cancel, || {
                let attempts = attempts_clone.clone();
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(FailedCall::status(503, None, io_error("unavailable")))
                    } else {
                        Ok("success")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_orchestrator_exhausted() {
        let orchestrator = orchestrator(2);
        let cancel = CancellationToken::new();
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result: AdmissionResult<()> = orchestrator
            .execute(&cancel, || {
                let attempts = attempts_clone.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(FailedCall::transport(io_error("connection reset")))
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(AdmissionError::RetriesExhausted {
                attempts: 3,
                last_status: None,
                ..
            })
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 3); // Initial + 2 retries
    }

    #[tokio::test(start_paused = true)]
    async fn test_orchestrator_non_retryable() {
        let orchestrator = orchestrator(3);
        let cancel = CancellationToken::new();
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result: AdmissionResult<()> = orchestrator
            .execute(&cancel, || {
                let attempts = attempts_clone.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(FailedCall::status(404, None, io_error("no such track")))
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(AdmissionError::Rejected { status: 404, .. })
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_orchestrator_throttle_enters_cooldown() {
        let orchestrator = orchestrator(3);
        let cancel = CancellationToken::new();
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let start = tokio::time::Instant::now();

        let result = orchestrator
            .execute(&cancel, || {
                let attempts = attempts_clone.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(FailedCall::status(
                            429,
                            Some(Duration::from_millis(500)),
                            io_error("slow down"),
                        ))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert!(start.elapsed() >= Duration::from_millis(500));

        let metrics = orchestrator.gate().metrics();
        assert_eq!(metrics.throttled, 1);
        assert_eq!(metrics.granted, 2);
    }

    #[test]
    fn test_with_gate_rejects_invalid_policy() {
        let gate = Arc::new(AdmissionGate::new(GateConfig::new()).unwrap());
        let policy = RetryPolicy::new(RetryConfig::new().backoff_factor(0.0));

        let result = RequestOrchestrator::with_gate(gate, policy);

        assert!(matches!(
            result,
            Err(AdmissionError::Configuration(
                ConfigurationError::InvalidBackoffFactor(_)
            ))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_orchestrator_cancelled_during_backoff() {
        let orchestrator = RequestOrchestrator::new(
            AdmissionConfig::builder()
                .base_delay(Duration::from_secs(10))
                .max_delay(Duration::from_secs(60))
                .build()
                .unwrap(),
        )
        .unwrap();
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let start = tokio::time::Instant::now();
        let result: AdmissionResult<()> = orchestrator
            .execute(&cancel, || async {
                Err(FailedCall::status(500, None, io_error("boom")))
            })
            .await;

        assert!(matches!(result, Err(AdmissionError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_failed_call_display() {
        let failure = FailedCall::status(503, None, io_error("unavailable"));
        assert_eq!(failure.to_string(), "HTTP 503: unavailable");

        let failure = FailedCall::transport(io_error("reset"));
        assert_eq!(failure.to_string(), "transport failure: reset");
    }
}
