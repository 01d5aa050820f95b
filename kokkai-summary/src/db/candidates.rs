//! Candidate selection
//!
//! A proceeding needs a (re)summary when it has transcript text and the
//! highest prompt version among its summaries (0 when it has none) is below
//! the target version. Unsummarized and stale proceedings compete in one
//! pool, ordered by:
//! 1. existing max prompt version, ascending
//! 2. session number, descending (recent sessions first)
//! 3. total transcript characters, descending (larger bodies first)

use kokkai_common::db::models::FULL_TRANSCRIPT_KIND;
use serde::Serialize;
use sqlx::SqliteConnection;

/// Proceeding selected for summarization in one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Candidate {
    pub issue_id: String,
    pub session: i64,
    /// Highest existing prompt version, 0 if never summarized
    pub max_prompt_version: i64,
    /// Sum of character lengths of non-empty speeches
    pub transcript_length: i64,
}

/// Selection parameters for one cycle
#[derive(Debug, Clone)]
pub struct SelectionCriteria {
    pub target_prompt_version: i64,
    pub batch_size: usize,
    /// Only this meeting kind carries full transcripts
    pub meeting_kind: String,
    /// Restrict to one legislative session
    pub session: Option<i64>,
}

impl SelectionCriteria {
    pub fn new(target_prompt_version: i64, batch_size: usize) -> Self {
        Self {
            target_prompt_version,
            batch_size,
            meeting_kind: FULL_TRANSCRIPT_KIND.to_string(),
            session: None,
        }
    }
}

/// Select up to `batch_size` candidates in priority order (read-only)
pub async fn select_candidates(
    conn: &mut SqliteConnection,
    criteria: &SelectionCriteria,
) -> Result<Vec<Candidate>, sqlx::Error> {
    let limit = i64::try_from(criteria.batch_size).unwrap_or(i64::MAX);

    let candidates = sqlx::query_as::<_, Candidate>(
        r#"
        SELECT m.issue_id AS issue_id,
               m.session AS session,
               COALESCE(v.max_prompt_version, 0) AS max_prompt_version,
               t.transcript_length AS transcript_length
        FROM meetings m
        INNER JOIN (
            SELECT issue_id, SUM(LENGTH(speech)) AS transcript_length
            FROM speeches
            WHERE speech IS NOT NULL AND speech <> ''
            GROUP BY issue_id
        ) t ON t.issue_id = m.issue_id
        LEFT JOIN (
            SELECT issue_id, MAX(prompt_version) AS max_prompt_version
            FROM summaries
            GROUP BY issue_id
        ) v ON v.issue_id = m.issue_id
        WHERE m.image_kind = ?
          AND (? IS NULL OR m.session = ?)
          AND COALESCE(v.max_prompt_version, 0) < ?
        ORDER BY max_prompt_version ASC,
                 m.session DESC,
                 t.transcript_length DESC,
                 m.issue_id ASC
        LIMIT ?
        "#,
    )
    .bind(&criteria.meeting_kind)
    .bind(criteria.session)
    .bind(criteria.session)
    .bind(criteria.target_prompt_version)
    .bind(limit)
    .fetch_all(conn)
    .await?;

    tracing::debug!(
        target_prompt_version = criteria.target_prompt_version,
        batch_size = criteria.batch_size,
        session = ?criteria.session,
        selected = candidates.len(),
        "Candidates selected"
    );

    Ok(candidates)
}
