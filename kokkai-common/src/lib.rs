//! # Kokkai Common Library
//!
//! Shared code for the Diet proceedings pipeline:
//! - Database models and schema
//! - Configuration and secret resolution
//! - Common error type

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
