//! Summary persistence
//!
//! Summaries are append-only: a new prompt version or model produces a new
//! row, existing rows are never updated or deleted here.

use kokkai_common::db::models::Summary;
use sqlx::SqliteConnection;

/// Stage a summary row (commit is the caller's responsibility)
pub async fn insert_summary(
    conn: &mut SqliteConnection,
    summary: &Summary,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO summaries (
            issue_id, summary, model, prompt_version, create_time, update_time
        ) VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&summary.issue_id)
    .bind(&summary.summary)
    .bind(&summary.model)
    .bind(summary.prompt_version)
    .bind(summary.create_time)
    .bind(summary.update_time)
    .execute(conn)
    .await?;

    Ok(())
}

/// Current summary: highest prompt version, then most recently updated
pub async fn load_current_summary(
    conn: &mut SqliteConnection,
    issue_id: &str,
) -> Result<Option<Summary>, sqlx::Error> {
    sqlx::query_as::<_, Summary>(
        r#"
        SELECT issue_id, summary, model, prompt_version, create_time, update_time
        FROM summaries
        WHERE issue_id = ?
        ORDER BY prompt_version DESC, update_time DESC
        LIMIT 1
        "#,
    )
    .bind(issue_id)
    .fetch_optional(conn)
    .await
}

/// Full summary history for a proceeding, newest first
pub async fn load_summaries(
    conn: &mut SqliteConnection,
    issue_id: &str,
) -> Result<Vec<Summary>, sqlx::Error> {
    sqlx::query_as::<_, Summary>(
        r#"
        SELECT issue_id, summary, model, prompt_version, create_time, update_time
        FROM summaries
        WHERE issue_id = ?
        ORDER BY create_time DESC, prompt_version DESC
        "#,
    )
    .bind(issue_id)
    .fetch_all(conn)
    .await
}
