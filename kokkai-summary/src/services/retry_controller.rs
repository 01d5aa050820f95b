//! Generation retry controller
//!
//! Wraps a [`SummaryGenerator`] with a bounded-attempt retry policy.
//!
//! **Algorithm:**
//! 1. Attempt generation
//! 2. If successful, return the text
//! 3. If the failure is retryable and attempts remain:
//!    wait `hint + backoff(attempt)`, then attempt again
//! 4. Otherwise give up with the last failure (fatal and unexpected failures
//!    give up on first occurrence)
//!
//! **Delay:**
//! - hint: upstream `retryDelay` + padding (5s), or the fixed fallback (60s)
//! - backoff: 10s, doubling per attempt, capped at 300s
//!
//! Cancellation is honored before every attempt, while an attempt is in
//! flight, and during every wait.

use super::generation::{GenerationError, SummaryGenerator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Retry policy settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Fixed delay when upstream gives no hint
    pub fallback_delay_secs: u64,
    /// Added to an upstream-suggested delay
    pub hint_padding_secs: u64,
    /// First exponential backoff term
    pub backoff_base_secs: u64,
    /// Upper bound of the exponential backoff term
    pub backoff_cap_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            fallback_delay_secs: 60,
            hint_padding_secs: 5,
            backoff_base_secs: 10,
            backoff_cap_secs: 300,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff term after failed attempt `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let secs = self
            .backoff_base_secs
            .saturating_mul(1u64 << exponent)
            .min(self.backoff_cap_secs);
        Duration::from_secs(secs)
    }

    /// Total wait before the attempt following failed attempt `attempt`
    pub fn delay_for(&self, error: &GenerationError, attempt: u32) -> Duration {
        let hint = match error.suggested_delay() {
            Some(suggested) => suggested.saturating_add(Duration::from_secs(self.hint_padding_secs)),
            None => Duration::from_secs(self.fallback_delay_secs),
        };
        hint.saturating_add(self.backoff(attempt))
    }
}

/// Successful generation with retry bookkeeping
#[derive(Debug, Clone)]
pub struct Generated {
    pub text: String,
    pub attempts: u32,
    pub waits: Vec<Duration>,
}

/// Terminal failure of a retry sequence
#[derive(Debug, Error)]
pub enum RetryFailure {
    #[error("Gave up after {attempts} attempt(s): {last_error}")]
    GaveUp {
        last_error: GenerationError,
        attempts: u32,
        waits: Vec<Duration>,
    },

    #[error("Cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
}

/// Per-invocation retry state
#[derive(Debug)]
enum RetryState {
    Attempting { attempt: u32 },
    RetryScheduled { attempt: u32, delay: Duration },
    Success { text: String, attempts: u32 },
    GaveUp { error: GenerationError, attempts: u32 },
}

/// Bounded retry around a generator
#[derive(Clone)]
pub struct RetryController {
    generator: Arc<dyn SummaryGenerator>,
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(generator: Arc<dyn SummaryGenerator>, policy: RetryPolicy) -> Self {
        Self { generator, policy }
    }

    /// Model identifier of the wrapped generator
    pub fn model(&self) -> &str {
        self.generator.model()
    }

    /// Run the retry state machine for one transcript
    pub async fn generate(
        &self,
        transcript: &str,
        cancel: &CancellationToken,
    ) -> Result<Generated, RetryFailure> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut waits = Vec::new();
        let mut state = RetryState::Attempting { attempt: 1 };

        loop {
            state = match state {
                RetryState::Attempting { attempt } => {
                    if cancel.is_cancelled() {
                        return Err(RetryFailure::Cancelled {
                            attempts: attempt - 1,
                        });
                    }

                    if attempt > 1 {
                        tracing::debug!(attempt, max_attempts, "Retrying generation");
                    }

                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return Err(RetryFailure::Cancelled { attempts: attempt });
                        }
                        result = self.generator.generate(transcript) => result,
                    };

                    match result {
                        Ok(text) => RetryState::Success {
                            text,
                            attempts: attempt,
                        },
                        Err(error) if error.is_retryable() && attempt < max_attempts => {
                            let delay = self.policy.delay_for(&error, attempt);
                            tracing::warn!(
                                attempt,
                                max_attempts,
                                delay_ms = delay.as_millis() as u64,
                                error = %error,
                                "Retryable generation failure, will retry after delay"
                            );
                            RetryState::RetryScheduled { attempt, delay }
                        }
                        Err(error) => RetryState::GaveUp {
                            error,
                            attempts: attempt,
                        },
                    }
                }
                RetryState::RetryScheduled { attempt, delay } => {
                    waits.push(delay);
                    if !sleep_or_cancel(delay, cancel).await {
                        return Err(RetryFailure::Cancelled { attempts: attempt });
                    }
                    RetryState::Attempting {
                        attempt: attempt + 1,
                    }
                }
                RetryState::Success { text, attempts } => {
                    if attempts > 1 {
                        tracing::info!(attempts, "Generation succeeded after retry");
                    }
                    return Ok(Generated {
                        text,
                        attempts,
                        waits,
                    });
                }
                RetryState::GaveUp { error, attempts } => {
                    tracing::error!(
                        attempts,
                        retryable = error.is_retryable(),
                        error = %error,
                        "Generation gave up"
                    );
                    return Err(RetryFailure::GaveUp {
                        last_error: error,
                        attempts,
                        waits,
                    });
                }
            };
        }
    }
}

/// Sleep for `duration` unless cancelled first. Returns `false` on cancellation.
pub(crate) async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    if duration.is_zero() {
        return true;
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
