//! Summary writer
//!
//! Cleans generated text and stages the summary row inside the caller's
//! transaction.

use crate::db::summaries::insert_summary;
use chrono::Utc;
use kokkai_common::db::models::Summary;
use sqlx::SqliteConnection;

/// First heading of the summary template
pub const DEFAULT_SECTION_MARKER: &str = "## 決議された事項";

/// Drop any preamble the model wrote before the templated output.
///
/// Everything before the first occurrence of `marker` is discarded; text
/// without the marker is returned unchanged.
pub fn clean_summary_text<'a>(raw: &'a str, marker: &str) -> &'a str {
    if marker.is_empty() {
        return raw;
    }
    match raw.find(marker) {
        Some(position) => &raw[position..],
        None => raw,
    }
}

/// Builds and stages summary rows
#[derive(Debug, Clone)]
pub struct SummaryWriter {
    section_marker: String,
}

impl SummaryWriter {
    pub fn new(section_marker: impl Into<String>) -> Self {
        Self {
            section_marker: section_marker.into(),
        }
    }

    /// Build the summary row and insert it on `conn` without committing
    pub async fn stage(
        &self,
        conn: &mut SqliteConnection,
        issue_id: &str,
        raw_text: &str,
        model: &str,
        prompt_version: i64,
    ) -> Result<Summary, sqlx::Error> {
        let cleaned = clean_summary_text(raw_text, &self.section_marker);
        if cleaned.len() != raw_text.len() {
            tracing::debug!(
                issue_id,
                trimmed_bytes = raw_text.len() - cleaned.len(),
                "Discarded preamble before section marker"
            );
        }

        let now = Utc::now();
        let summary = Summary {
            issue_id: issue_id.to_string(),
            summary: Some(cleaned.to_string()),
            model: model.to_string(),
            prompt_version,
            create_time: now,
            update_time: now,
        };

        insert_summary(conn, &summary).await?;

        tracing::debug!(issue_id, model, prompt_version, "Staged summary for commit");

        Ok(summary)
    }
}

impl Default for SummaryWriter {
    fn default() -> Self {
        Self::new(DEFAULT_SECTION_MARKER)
    }
}
