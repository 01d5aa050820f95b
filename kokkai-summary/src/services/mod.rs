//! Summary pipeline services
//!
//! Leaf-first: [`generation`] (trait + outcome taxonomy), [`gemini_client`]
//! (HTTP implementation), [`retry_controller`], [`summary_writer`],
//! [`job_runner`].

pub mod gemini_client;
pub mod generation;
pub mod job_runner;
pub mod retry_controller;
pub mod summary_writer;

pub use gemini_client::GeminiClient;
pub use generation::{GenerationError, SummaryGenerator};
pub use job_runner::{CycleReport, JobRunner};
pub use retry_controller::{Generated, RetryController, RetryFailure, RetryPolicy};
pub use summary_writer::SummaryWriter;
