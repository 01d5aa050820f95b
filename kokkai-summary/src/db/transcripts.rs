//! Transcript assembly
//!
//! A proceeding's transcript is the text of its speeches in `speech_order`,
//! one speech per line. Speeches without text are left out entirely.

use crate::error::SummaryError;
use kokkai_common::db::models::Proceeding;
use sqlx::SqliteConnection;

/// Load proceeding by issue id
pub async fn load_proceeding(
    conn: &mut SqliteConnection,
    issue_id: &str,
) -> Result<Option<Proceeding>, sqlx::Error> {
    sqlx::query_as::<_, Proceeding>(
        r#"
        SELECT issue_id, image_kind, search_object, session, name_of_house,
               name_of_meeting, issue, date, closing, meeting_url, pdf_url
        FROM meetings
        WHERE issue_id = ?
        "#,
    )
    .bind(issue_id)
    .fetch_optional(conn)
    .await
}

/// Build the generation input for one proceeding.
///
/// Fails with [`SummaryError::ProceedingNotFound`] when the proceeding does
/// not exist; returns an empty string when it exists but has no text.
pub async fn assemble_transcript(
    conn: &mut SqliteConnection,
    issue_id: &str,
) -> Result<String, SummaryError> {
    let proceeding = load_proceeding(&mut *conn, issue_id)
        .await?
        .ok_or_else(|| SummaryError::ProceedingNotFound(issue_id.to_string()))?;

    let speeches: Vec<Option<String>> = sqlx::query_scalar(
        r#"
        SELECT speech
        FROM speeches
        WHERE issue_id = ?
        ORDER BY speech_order ASC
        "#,
    )
    .bind(issue_id)
    .fetch_all(&mut *conn)
    .await?;

    let total = speeches.len();
    let texts: Vec<String> = speeches
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect();

    tracing::debug!(
        issue_id,
        meeting = proceeding.name_of_meeting.as_deref().unwrap_or(""),
        speeches = total,
        with_text = texts.len(),
        "Transcript assembled"
    );

    Ok(texts.join("\n"))
}
