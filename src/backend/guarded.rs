//! Retry and cancellation decorator for any [`GenerationBackend`].

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Generation, GenerationBackend, GenerationRequest, TokenUsage, UsageMeter};
use crate::cancel::CancellationRegistry;
use crate::errors::GenerationError;

/// Exponential backoff: `initial_backoff`, doubling, capped at `max_backoff`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, where `attempt` is 1-based.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Wraps a backend with a cancellation check before every attempt and
/// bounded retry of transient failures.
///
/// An attempt already handed to the inner backend is never interrupted;
/// cancellation is observed at the next attempt boundary. Successful calls
/// are counted in the backend's [`UsageMeter`].
pub struct GuardedBackend {
    inner: Arc<dyn GenerationBackend>,
    registry: CancellationRegistry,
    policy: RetryPolicy,
    meter: UsageMeter,
}

impl GuardedBackend {
    pub fn new(
        inner: Arc<dyn GenerationBackend>,
        registry: CancellationRegistry,
        policy: RetryPolicy,
    ) -> Self {
        debug!(max_attempts = policy.max_attempts, "Creating GuardedBackend");
        Self {
            inner,
            registry,
            policy,
            meter: UsageMeter::new(),
        }
    }

    /// Count usage into `meter` instead of a private one.
    pub fn with_meter(mut self, meter: UsageMeter) -> Self {
        self.meter = meter;
        self
    }

    pub fn usage(&self) -> TokenUsage {
        self.meter.snapshot()
    }

    pub fn reset_usage(&self) -> TokenUsage {
        self.meter.reset()
    }

    fn check_cancelled(&self, request: &GenerationRequest) -> Result<(), GenerationError> {
        if let Some(ref id) = request.context_id {
            self.registry.check(id)?;
        }
        Ok(())
    }
}

#[async_trait]
impl GenerationBackend for GuardedBackend {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        self.generate_detailed(request).await.map(|g| g.text)
    }

    async fn generate_detailed(
        &self,
        request: GenerationRequest,
    ) -> Result<Generation, GenerationError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.check_cancelled(&request)?;

            match self.inner.generate_detailed(request.clone()).await {
                Ok(generation) => {
                    self.meter.record(&request.prompt, &generation);
                    return Ok(generation);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.policy.backoff_for(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient backend failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_retryable() => {
                    return Err(GenerationError::RetriesExhausted {
                        attempts: attempt,
                        last: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}
