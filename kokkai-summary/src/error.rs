//! Error types for kokkai-summary
//!
//! Every failure inside one candidate's pipeline is a [`SummaryError`]. The
//! job runner decides from [`SummaryError::is_cycle_fatal`] whether to move on
//! to the next candidate or abort the cycle.

use crate::services::generation::GenerationError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Summary pipeline error
#[derive(Debug, Error)]
pub enum SummaryError {
    /// Candidate id does not exist in `meetings`
    #[error("Proceeding not found: {0}")]
    ProceedingNotFound(String),

    /// Generation gave up (fatal, unexpected, or retries exhausted)
    #[error("Generation failed after {attempts} attempt(s): {source}")]
    Generation {
        #[source]
        source: GenerationError,
        attempts: u32,
    },

    /// Connection-level storage failure; remaining candidates cannot be processed
    #[error("Storage connectivity error: {0}")]
    StorageConnectivity(#[source] sqlx::Error),

    /// Constraint violation, e.g. a concurrent writer inserted the same key
    #[error("Storage constraint violation: {0}")]
    StorageConstraint(#[source] sqlx::Error),

    /// Any other SQL failure
    #[error("Storage error: {0}")]
    Storage(#[source] sqlx::Error),

    /// Cancellation token fired
    #[error("Cancelled")]
    Cancelled,

    /// Invalid cycle parameters
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl SummaryError {
    /// Failure category used in logs and cycle reports
    pub fn kind(&self) -> FailureKind {
        match self {
            SummaryError::ProceedingNotFound(_) => FailureKind::ProceedingNotFound,
            SummaryError::Generation { source, .. } => match source {
                GenerationError::RetryableUpstream { .. } => FailureKind::RetryableUpstream,
                GenerationError::FatalUpstream { .. } => FailureKind::FatalUpstream,
                GenerationError::Unexpected { .. } => FailureKind::Unexpected,
            },
            SummaryError::StorageConnectivity(_) => FailureKind::StorageConnectivity,
            SummaryError::StorageConstraint(_) => FailureKind::StorageConstraint,
            SummaryError::Storage(_) => FailureKind::Storage,
            SummaryError::Cancelled => FailureKind::Cancelled,
            SummaryError::InvalidArgument(_) => FailureKind::InvalidArgument,
        }
    }

    /// True when the whole cycle must stop, not just the current candidate
    pub fn is_cycle_fatal(&self) -> bool {
        matches!(self, SummaryError::StorageConnectivity(_))
    }
}

impl From<sqlx::Error> for SummaryError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        match &err {
            sqlx::Error::Database(db_err) => match db_err.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => SummaryError::StorageConstraint(err),
                _ => SummaryError::Storage(err),
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => SummaryError::StorageConnectivity(err),
            _ => SummaryError::Storage(err),
        }
    }
}

/// Failure category as reported per candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ProceedingNotFound,
    RetryableUpstream,
    FatalUpstream,
    Unexpected,
    StorageConnectivity,
    StorageConstraint,
    Storage,
    Cancelled,
    InvalidArgument,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::ProceedingNotFound => "proceeding_not_found",
            FailureKind::RetryableUpstream => "retryable_upstream",
            FailureKind::FatalUpstream => "fatal_upstream",
            FailureKind::Unexpected => "unexpected",
            FailureKind::StorageConnectivity => "storage_connectivity",
            FailureKind::StorageConstraint => "storage_constraint",
            FailureKind::Storage => "storage",
            FailureKind::Cancelled => "cancelled",
            FailureKind::InvalidArgument => "invalid_argument",
        };
        f.write_str(name)
    }
}
