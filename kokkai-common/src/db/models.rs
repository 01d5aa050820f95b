//! Database models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Meeting kind of records that carry the full transcript. Agenda (`目次`)
/// and index (`索引`) records share the meetings table but have no speeches
/// worth summarizing.
pub const FULL_TRANSCRIPT_KIND: &str = "会議録";

/// One recorded meeting of a house or committee
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Proceeding {
    pub issue_id: String,
    pub image_kind: String,
    pub search_object: i64,
    pub session: i64,
    pub name_of_house: String,
    pub name_of_meeting: Option<String>,
    pub issue: String,
    pub date: Option<NaiveDate>,
    pub closing: Option<String>,
    pub meeting_url: String,
    pub pdf_url: Option<String>,
}

/// One speech within a proceeding, ordered by `speech_order`
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Utterance {
    pub speech_id: String,
    pub issue_id: String,
    pub speech_order: i64,
    pub speaker: Option<String>,
    pub speech: Option<String>,
    pub create_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
    pub speech_url: String,
}

/// Generated summary, keyed by (issue_id, model, prompt_version)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Summary {
    pub issue_id: String,
    pub summary: Option<String>,
    pub model: String,
    pub prompt_version: i64,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}
