//! Generation service boundary
//!
//! One call of [`SummaryGenerator::generate`] is exactly one request to the
//! upstream service. Retrying is the retry controller's job.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Typed outcome of a failed generation call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    /// Transient overload or rate limiting; may carry the upstream's retry hint
    #[error("Retryable upstream failure: {reason}")]
    RetryableUpstream {
        reason: String,
        suggested_delay: Option<Duration>,
    },

    /// Permanent rejection (bad input, auth, content policy, ...)
    #[error("Fatal upstream failure: {reason}")]
    FatalUpstream { reason: String },

    /// Anything outside the upstream's typed error surface
    #[error("Unexpected generation failure: {detail}")]
    Unexpected { detail: String },
}

impl GenerationError {
    /// Only upstream overload/rate-limit failures are retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, GenerationError::RetryableUpstream { .. })
    }

    /// Upstream-provided delay hint, if any
    pub fn suggested_delay(&self) -> Option<Duration> {
        match self {
            GenerationError::RetryableUpstream { suggested_delay, .. } => *suggested_delay,
            _ => None,
        }
    }
}

/// Turns an assembled transcript into summary text
#[async_trait]
pub trait SummaryGenerator: Send + Sync {
    /// Model identifier recorded on every summary row
    fn model(&self) -> &str;

    /// Perform one generation request
    async fn generate(&self, transcript: &str) -> Result<String, GenerationError>;
}
