//! Summary job runner
//!
//! Orchestrates one scheduling cycle:
//!
//! SELECTING → for each candidate: ASSEMBLING → GENERATING → WRITING →
//! COMMITTING → next candidate | DONE
//!
//! One pooled connection is held for the whole cycle and released when the
//! cycle returns. Candidates run strictly one after another. The summary
//! insert of each candidate runs in its own transaction, opened after
//! generation so that no SQLite read snapshot is held across the (possibly
//! long) retry waits. A failing candidate is rolled back and recorded; only
//! storage connectivity failures abort the rest of the batch.

use super::generation::SummaryGenerator;
use super::retry_controller::{sleep_or_cancel, RetryController, RetryFailure};
use super::summary_writer::SummaryWriter;
use crate::config::SummaryConfig;
use crate::db::candidates::{select_candidates, Candidate, SelectionCriteria};
use crate::db::transcripts::assemble_transcript;
use crate::error::{FailureKind, SummaryError};
use serde::Serialize;
use sqlx::{Connection, SqliteConnection, SqlitePool};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Per-candidate pipeline phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidatePhase {
    Assembling,
    Generating,
    Writing,
    Committing,
}

impl fmt::Display for CandidatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CandidatePhase::Assembling => "assembling",
            CandidatePhase::Generating => "generating",
            CandidatePhase::Writing => "writing",
            CandidatePhase::Committing => "committing",
        };
        f.write_str(name)
    }
}

/// Committed summary for one candidate
#[derive(Debug, Clone, Serialize)]
pub struct CandidateSuccess {
    pub issue_id: String,
    pub previous_prompt_version: i64,
    pub attempts: u32,
    pub summary_chars: usize,
}

/// Failed candidate with reason
#[derive(Debug, Clone, Serialize)]
pub struct CandidateFailure {
    pub issue_id: String,
    pub phase: CandidatePhase,
    pub kind: FailureKind,
    pub reason: String,
}

/// Why a cycle stopped before finishing its batch
#[derive(Debug, Clone, Serialize)]
pub struct CycleAbort {
    pub kind: FailureKind,
    pub reason: String,
}

/// Outcome of one scheduling cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub target_prompt_version: i64,
    pub selected: usize,
    pub attempted: usize,
    pub succeeded: Vec<CandidateSuccess>,
    pub failed: Vec<CandidateFailure>,
    pub aborted: Option<CycleAbort>,
    pub cancelled: bool,
}

impl CycleReport {
    fn new(cycle_id: Uuid, target_prompt_version: i64) -> Self {
        Self {
            cycle_id,
            target_prompt_version,
            selected: 0,
            attempted: 0,
            succeeded: Vec::new(),
            failed: Vec::new(),
            aborted: None,
            cancelled: false,
        }
    }

    fn abort(&mut self, error: &SummaryError) {
        self.aborted = Some(CycleAbort {
            kind: error.kind(),
            reason: error.to_string(),
        });
    }

    /// True when the cycle ran to completion (failed candidates allowed)
    pub fn is_success(&self) -> bool {
        self.aborted.is_none() && !self.cancelled
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.issue_id.as_str()).collect()
    }
}

/// Runs scheduling cycles against one database
pub struct JobRunner {
    pool: SqlitePool,
    retry: RetryController,
    writer: SummaryWriter,
    meeting_kind: String,
    session: Option<i64>,
    inter_candidate_delay: Duration,
}

impl JobRunner {
    pub fn new(pool: SqlitePool, generator: Arc<dyn SummaryGenerator>, config: &SummaryConfig) -> Self {
        Self {
            pool,
            retry: RetryController::new(generator, config.retry.clone()),
            writer: SummaryWriter::new(config.section_marker.clone()),
            meeting_kind: config.meeting_kind.clone(),
            session: config.session,
            inter_candidate_delay: config.inter_candidate_delay(),
        }
    }

    /// Run one cycle: select up to `batch_size` proceedings below
    /// `target_prompt_version` and summarize them in order.
    ///
    /// Only invalid arguments are returned as `Err`; storage aborts and
    /// cancellation are reported in the [`CycleReport`].
    pub async fn run_summary_cycle(
        &self,
        target_prompt_version: i64,
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> Result<CycleReport, SummaryError> {
        if target_prompt_version < 1 {
            return Err(SummaryError::InvalidArgument(format!(
                "target prompt version must be >= 1 (got {})",
                target_prompt_version
            )));
        }
        if batch_size < 1 {
            return Err(SummaryError::InvalidArgument(
                "batch size must be >= 1".to_string(),
            ));
        }

        let cycle_id = Uuid::new_v4();
        let span = tracing::info_span!("summary_cycle", %cycle_id, target_prompt_version);

        let report = self
            .run_cycle(cycle_id, target_prompt_version, batch_size, cancel)
            .instrument(span)
            .await;

        Ok(report)
    }

    async fn run_cycle(
        &self,
        cycle_id: Uuid,
        target_prompt_version: i64,
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> CycleReport {
        let start_time = Instant::now();
        let mut report = CycleReport::new(cycle_id, target_prompt_version);

        tracing::info!(batch_size, session = ?self.session, "Starting summary cycle");

        // Held for the whole cycle, returned to the pool on drop
        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                let error = SummaryError::from(e);
                tracing::error!(error = %error, "Failed to acquire database connection");
                report.abort(&error);
                return report;
            }
        };

        // SELECTING
        let criteria = SelectionCriteria {
            target_prompt_version,
            batch_size,
            meeting_kind: self.meeting_kind.clone(),
            session: self.session,
        };
        let candidates = match select_candidates(&mut conn, &criteria).await {
            Ok(candidates) => candidates,
            Err(e) => {
                let error = SummaryError::from(e);
                tracing::error!(error = %error, "Candidate selection failed");
                report.abort(&error);
                return report;
            }
        };
        report.selected = candidates.len();

        if candidates.is_empty() {
            tracing::info!("No proceedings need summarization");
            return report;
        }

        tracing::info!(selected = candidates.len(), "Candidates selected");

        for (index, candidate) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            report.attempted += 1;
            tracing::info!(
                issue_id = %candidate.issue_id,
                position = index + 1,
                total = candidates.len(),
                previous_prompt_version = candidate.max_prompt_version,
                session = candidate.session,
                transcript_length = candidate.transcript_length,
                "Processing candidate"
            );

            match self
                .process_candidate(&mut conn, candidate, target_prompt_version, cancel)
                .await
            {
                Ok(success) => {
                    tracing::info!(
                        issue_id = %success.issue_id,
                        attempts = success.attempts,
                        summary_chars = success.summary_chars,
                        "Summary committed"
                    );
                    report.succeeded.push(success);

                    let is_last = index + 1 == candidates.len();
                    if !is_last && !sleep_or_cancel(self.inter_candidate_delay, cancel).await {
                        report.cancelled = true;
                        break;
                    }
                }
                Err((phase, error)) => {
                    tracing::warn!(
                        issue_id = %candidate.issue_id,
                        %phase,
                        kind = %error.kind(),
                        error = %error,
                        "Candidate failed, rolled back"
                    );
                    report.failed.push(CandidateFailure {
                        issue_id: candidate.issue_id.clone(),
                        phase,
                        kind: error.kind(),
                        reason: error.to_string(),
                    });

                    if matches!(error, SummaryError::Cancelled) {
                        report.cancelled = true;
                        break;
                    }
                    if error.is_cycle_fatal() {
                        tracing::error!("Storage connectivity lost, aborting cycle");
                        report.abort(&error);
                        break;
                    }
                }
            }
        }

        drop(conn);

        tracing::info!(
            attempted = report.attempted,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            cancelled = report.cancelled,
            aborted = report.aborted.is_some(),
            duration_seconds = start_time.elapsed().as_secs(),
            "Summary cycle finished"
        );

        report
    }

    /// Assemble, generate, write and commit one candidate
    async fn process_candidate(
        &self,
        conn: &mut SqliteConnection,
        candidate: &Candidate,
        target_prompt_version: i64,
        cancel: &CancellationToken,
    ) -> Result<CandidateSuccess, (CandidatePhase, SummaryError)> {
        let issue_id = candidate.issue_id.as_str();

        // ASSEMBLING
        let transcript = assemble_transcript(&mut *conn, issue_id)
            .await
            .map_err(|e| (CandidatePhase::Assembling, e))?;

        // GENERATING
        let generated = self
            .retry
            .generate(&transcript, cancel)
            .await
            .map_err(|failure| {
                let error = match failure {
                    RetryFailure::GaveUp {
                        last_error,
                        attempts,
                        ..
                    } => SummaryError::Generation {
                        source: last_error,
                        attempts,
                    },
                    RetryFailure::Cancelled { .. } => SummaryError::Cancelled,
                };
                (CandidatePhase::Generating, error)
            })?;

        // WRITING
        let mut tx = conn
            .begin()
            .await
            .map_err(|e| (CandidatePhase::Writing, SummaryError::from(e)))?;

        let staged = self
            .writer
            .stage(
                &mut tx,
                issue_id,
                &generated.text,
                self.retry.model(),
                target_prompt_version,
            )
            .await;

        let summary = match staged {
            Ok(summary) => summary,
            Err(e) => {
                rollback(tx, issue_id).await;
                return Err((CandidatePhase::Writing, SummaryError::from(e)));
            }
        };

        if cancel.is_cancelled() {
            rollback(tx, issue_id).await;
            return Err((CandidatePhase::Committing, SummaryError::Cancelled));
        }

        // COMMITTING
        tx.commit()
            .await
            .map_err(|e| (CandidatePhase::Committing, SummaryError::from(e)))?;

        Ok(CandidateSuccess {
            issue_id: candidate.issue_id.clone(),
            previous_prompt_version: candidate.max_prompt_version,
            attempts: generated.attempts,
            summary_chars: summary.summary.as_deref().map_or(0, |s| s.chars().count()),
        })
    }
}

async fn rollback(tx: sqlx::Transaction<'_, sqlx::Sqlite>, issue_id: &str) {
    if let Err(e) = tx.rollback().await {
        // Dropping the transaction still rolls back on the next use of the connection
        tracing::warn!(issue_id, error = %e, "Explicit rollback failed");
    }
}
