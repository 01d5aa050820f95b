//! kokkai-summary library interface
//!
//! Summarization scheduler for Diet proceedings: picks proceedings whose
//! summary is missing or was produced by an older prompt version, asks the
//! generation service for a new summary with bounded retry, and appends the
//! result to the `summaries` table one transaction per proceeding.
//!
//! Exposes public APIs for integration testing.

pub mod config;
pub mod db;
pub mod error;
pub mod services;

pub use crate::error::{FailureKind, SummaryError};
pub use crate::services::job_runner::{CycleReport, JobRunner};
