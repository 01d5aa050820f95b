//! Database access for kokkai-summary
//!
//! All functions take a `&mut SqliteConnection` so that one cycle can run on
//! a single pooled connection and per-candidate transactions can be passed
//! in through deref.

pub mod candidates;
pub mod summaries;
pub mod transcripts;

pub use candidates::{select_candidates, Candidate, SelectionCriteria};
pub use summaries::{insert_summary, load_current_summary, load_summaries};
pub use transcripts::{assemble_transcript, load_proceeding};
