//! Shared test helpers
//!
//! Temporary SQLite databases seeded with proceedings/speeches/summaries and
//! a scripted generator standing in for the upstream service.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use kokkai_common::db::init::init_database;
use kokkai_common::db::models::{Proceeding, Summary, Utterance, FULL_TRANSCRIPT_KIND};
use kokkai_summary::config::SummaryConfig;
use kokkai_summary::services::retry_controller::RetryPolicy;
use kokkai_summary::services::{GenerationError, SummaryGenerator};
use sqlx::SqlitePool;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tempfile::TempDir;

pub const TEST_MODEL: &str = "test-model";

/// Create temporary test database with the shared schema
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().expect("temp dir");
    let pool = init_database(&temp_dir.path().join("kokkai_test.db"))
        .await
        .expect("database init");
    (temp_dir, pool)
}

/// Scheduler config with all waits disabled
pub fn fast_config() -> SummaryConfig {
    SummaryConfig {
        inter_candidate_delay_secs: 0,
        retry: RetryPolicy {
            max_attempts: 3,
            fallback_delay_secs: 0,
            hint_padding_secs: 0,
            backoff_base_secs: 0,
            backoff_cap_secs: 0,
        },
        ..SummaryConfig::default()
    }
}

pub fn proceeding(issue_id: &str, session: i64, image_kind: &str) -> Proceeding {
    Proceeding {
        issue_id: issue_id.to_string(),
        image_kind: image_kind.to_string(),
        search_object: 0,
        session,
        name_of_house: "衆議院".to_string(),
        name_of_meeting: Some("予算委員会".to_string()),
        issue: "第1号".to_string(),
        date: chrono::NaiveDate::from_ymd_opt(2024, 1, 30),
        closing: None,
        meeting_url: format!("https://kokkai.ndl.go.jp/txt/{}", issue_id),
        pdf_url: None,
    }
}

pub async fn insert_proceeding(pool: &SqlitePool, p: &Proceeding) {
    sqlx::query(
        r#"
        INSERT INTO meetings (issue_id, image_kind, search_object, session, name_of_house,
                              name_of_meeting, issue, date, closing, meeting_url, pdf_url)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&p.issue_id)
    .bind(&p.image_kind)
    .bind(p.search_object)
    .bind(p.session)
    .bind(&p.name_of_house)
    .bind(&p.name_of_meeting)
    .bind(&p.issue)
    .bind(p.date)
    .bind(&p.closing)
    .bind(&p.meeting_url)
    .bind(&p.pdf_url)
    .execute(pool)
    .await
    .expect("insert meeting");
}

pub async fn insert_utterance(pool: &SqlitePool, issue_id: &str, order: i64, text: Option<&str>) {
    let utterance = Utterance {
        speech_id: format!("{}_{:03}", issue_id, order),
        issue_id: issue_id.to_string(),
        speech_order: order,
        speaker: Some("議長".to_string()),
        speech: text.map(str::to_string),
        create_time: None,
        update_time: None,
        speech_url: format!("https://kokkai.ndl.go.jp/txt/{}/{}", issue_id, order),
    };

    sqlx::query(
        r#"
        INSERT INTO speeches (speech_id, issue_id, speech_order, speaker, speech,
                              create_time, update_time, speech_url)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&utterance.speech_id)
    .bind(&utterance.issue_id)
    .bind(utterance.speech_order)
    .bind(&utterance.speaker)
    .bind(&utterance.speech)
    .bind(utterance.create_time)
    .bind(utterance.update_time)
    .bind(&utterance.speech_url)
    .execute(pool)
    .await
    .expect("insert speech");
}

/// Full-transcript proceeding with one speech of `length` characters
pub async fn seed_proceeding(pool: &SqlitePool, issue_id: &str, session: i64, length: usize) {
    insert_proceeding(pool, &proceeding(issue_id, session, FULL_TRANSCRIPT_KIND)).await;
    insert_utterance(pool, issue_id, 1, Some(&"あ".repeat(length))).await;
}

pub async fn insert_summary_row(pool: &SqlitePool, issue_id: &str, model: &str, prompt_version: i64, day: u32) {
    let time = Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap();
    let summary = Summary {
        issue_id: issue_id.to_string(),
        summary: Some(format!("v{} summary", prompt_version)),
        model: model.to_string(),
        prompt_version,
        create_time: time,
        update_time: time,
    };

    let mut conn = pool.acquire().await.unwrap();
    kokkai_summary::db::insert_summary(&mut conn, &summary)
        .await
        .expect("insert summary");
}

pub async fn count_summaries(pool: &SqlitePool, issue_id: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM summaries WHERE issue_id = ?")
        .bind(issue_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Generator answering per transcript content, recording every call
pub struct ScriptedGenerator {
    /// Outcomes keyed by a substring of the transcript
    scripts: Mutex<HashMap<String, VecDeque<Result<String, GenerationError>>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue outcomes for transcripts containing `needle`
    pub fn script(self, needle: &str, outcomes: Vec<Result<String, GenerationError>>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(needle.to_string(), outcomes.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SummaryGenerator for ScriptedGenerator {
    fn model(&self) -> &str {
        TEST_MODEL
    }

    async fn generate(&self, transcript: &str) -> Result<String, GenerationError> {
        self.calls.lock().unwrap().push(transcript.to_string());

        let mut scripts = self.scripts.lock().unwrap();
        for (needle, outcomes) in scripts.iter_mut() {
            if transcript.contains(needle.as_str()) {
                if let Some(outcome) = outcomes.pop_front() {
                    return outcome;
                }
            }
        }

        Ok(format!("前置き\n## 決議された事項\n* {}文字の会議", transcript.chars().count()))
    }
}
