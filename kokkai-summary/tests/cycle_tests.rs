//! End-to-end scheduling cycles against a temporary database

mod helpers;

use async_trait::async_trait;
use chrono::Utc;
use helpers::*;
use kokkai_common::db::models::Summary;
use kokkai_summary::db::{load_current_summary, load_summaries, select_candidates, SelectionCriteria};
use kokkai_summary::error::FailureKind;
use kokkai_summary::services::job_runner::CandidatePhase;
use kokkai_summary::services::{GenerationError, SummaryGenerator};
use kokkai_summary::{JobRunner, SummaryError};
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Full-transcript proceeding with a single speech
async fn seed(pool: &SqlitePool, issue_id: &str, text: &str) {
    insert_proceeding(pool, &proceeding(issue_id, 213, "会議録")).await;
    insert_utterance(pool, issue_id, 1, Some(text)).await;
}

fn retryable() -> Result<String, GenerationError> {
    Err(GenerationError::RetryableUpstream {
        reason: "HTTP 503".to_string(),
        suggested_delay: None,
    })
}

#[tokio::test]
async fn test_empty_database_is_a_successful_noop() {
    let (_temp_dir, pool) = create_test_db().await;
    let generator = Arc::new(ScriptedGenerator::new());
    let runner = JobRunner::new(pool.clone(), generator.clone(), &fast_config());

    let report = runner
        .run_summary_cycle(2, 5, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.selected, 0);
    assert_eq!(report.attempted, 0);
    assert!(generator.calls().is_empty());
}

#[tokio::test]
async fn test_cycle_summarizes_and_second_cycle_is_idle() {
    let (_temp_dir, pool) = create_test_db().await;
    seed(&pool, "long", "長い発言です。長い発言です。").await;
    seed(&pool, "short", "短い発言").await;

    let generator = Arc::new(ScriptedGenerator::new());
    let runner = JobRunner::new(pool.clone(), generator.clone(), &fast_config());

    let report = runner
        .run_summary_cycle(2, 10, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.selected, 2);
    let ids: Vec<&str> = report.succeeded.iter().map(|s| s.issue_id.as_str()).collect();
    assert_eq!(ids, vec!["long", "short"]);

    let mut conn = pool.acquire().await.unwrap();
    let summary = load_current_summary(&mut conn, "long").await.unwrap().unwrap();
    assert_eq!(summary.model, TEST_MODEL);
    assert_eq!(summary.prompt_version, 2);
    // Preamble before the section marker is dropped
    assert!(summary.summary.unwrap().starts_with("## 決議された事項"));
    drop(conn);

    let second = runner
        .run_summary_cycle(2, 10, &CancellationToken::new())
        .await
        .unwrap();
    assert!(second.is_success());
    assert_eq!(second.selected, 0);
    assert_eq!(generator.calls().len(), 2);
}

#[tokio::test]
async fn test_write_failure_is_isolated_to_its_candidate() {
    let (_temp_dir, pool) = create_test_db().await;
    seed(&pool, "first", "ああああああ").await;
    seed(&pool, "second", "いいいい").await;
    seed(&pool, "third", "うう").await;

    sqlx::query(
        r#"
        CREATE TRIGGER reject_second BEFORE INSERT ON summaries
        WHEN NEW.issue_id = 'second'
        BEGIN
            SELECT RAISE(ABORT, 'write rejected');
        END
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    let runner = JobRunner::new(pool.clone(), Arc::new(ScriptedGenerator::new()), &fast_config());
    let report = runner
        .run_summary_cycle(2, 10, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.attempted, 3);
    assert_eq!(report.succeeded.len(), 2);
    assert_eq!(report.failed_ids(), vec!["second"]);
    assert_eq!(report.failed[0].phase, CandidatePhase::Writing);
    assert_ne!(report.failed[0].kind, FailureKind::StorageConnectivity);

    assert_eq!(count_summaries(&pool, "first").await, 1);
    assert_eq!(count_summaries(&pool, "second").await, 0);
    assert_eq!(count_summaries(&pool, "third").await, 1);
}

/// Writes the same summary key from another connection while "generating"
struct RacingGenerator {
    pool: SqlitePool,
    issue_id: String,
    prompt_version: i64,
}

#[async_trait]
impl SummaryGenerator for RacingGenerator {
    fn model(&self) -> &str {
        TEST_MODEL
    }

    async fn generate(&self, _transcript: &str) -> Result<String, GenerationError> {
        let now = Utc::now();
        let summary = Summary {
            issue_id: self.issue_id.clone(),
            summary: Some("written elsewhere".to_string()),
            model: TEST_MODEL.to_string(),
            prompt_version: self.prompt_version,
            create_time: now,
            update_time: now,
        };
        let mut conn = self.pool.acquire().await.unwrap();
        kokkai_summary::db::insert_summary(&mut conn, &summary)
            .await
            .unwrap();

        Ok("## 決議された事項\nours".to_string())
    }
}

#[tokio::test]
async fn test_concurrent_writer_conflict_is_a_constraint_failure() {
    let (_temp_dir, pool) = create_test_db().await;
    seed(&pool, "P", "本文").await;

    let generator = RacingGenerator {
        pool: pool.clone(),
        issue_id: "P".to_string(),
        prompt_version: 2,
    };
    let runner = JobRunner::new(pool.clone(), Arc::new(generator), &fast_config());

    let report = runner
        .run_summary_cycle(2, 1, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].kind, FailureKind::StorageConstraint);
    assert_eq!(report.failed[0].phase, CandidatePhase::Writing);

    let mut conn = pool.acquire().await.unwrap();
    let rows = load_summaries(&mut conn, "P").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].summary.as_deref(), Some("written elsewhere"));
}

#[tokio::test]
async fn test_generation_failures_do_not_stop_the_batch() {
    let (_temp_dir, pool) = create_test_db().await;
    seed(&pool, "rejected", "REJECT この発言は長めです").await;
    seed(&pool, "flaky", "FLAKY 発言です").await;
    seed(&pool, "overloaded", "BUSY 発言").await;

    let generator = Arc::new(
        ScriptedGenerator::new()
            .script(
                "REJECT",
                vec![Err(GenerationError::FatalUpstream {
                    reason: "HTTP 400".to_string(),
                })],
            )
            .script("FLAKY", vec![retryable(), retryable()])
            .script("BUSY", vec![retryable(), retryable(), retryable()]),
    );
    let runner = JobRunner::new(pool.clone(), generator.clone(), &fast_config());

    let report = runner
        .run_summary_cycle(2, 10, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.attempted, 3);

    // Fatal: one call, no retry
    let rejected = &report.failed[0];
    assert_eq!(rejected.issue_id, "rejected");
    assert_eq!(rejected.kind, FailureKind::FatalUpstream);
    assert_eq!(rejected.phase, CandidatePhase::Generating);

    // Two retryable failures then success on the third attempt
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.succeeded[0].issue_id, "flaky");
    assert_eq!(report.succeeded[0].attempts, 3);

    // Attempt cap of 3 exhausted
    let overloaded = &report.failed[1];
    assert_eq!(overloaded.issue_id, "overloaded");
    assert_eq!(overloaded.kind, FailureKind::RetryableUpstream);

    let calls = generator.calls();
    assert_eq!(calls.iter().filter(|t| t.contains("REJECT")).count(), 1);
    assert_eq!(calls.iter().filter(|t| t.contains("FLAKY")).count(), 3);
    assert_eq!(calls.iter().filter(|t| t.contains("BUSY")).count(), 3);

    assert_eq!(count_summaries(&pool, "rejected").await, 0);
    assert_eq!(count_summaries(&pool, "overloaded").await, 0);
}

#[tokio::test]
async fn test_resummarization_appends_and_keeps_history() {
    let (_temp_dir, pool) = create_test_db().await;
    seed(&pool, "P", "本文").await;
    insert_summary_row(&pool, "P", TEST_MODEL, 1, 1).await;

    let runner = JobRunner::new(pool.clone(), Arc::new(ScriptedGenerator::new()), &fast_config());
    let report = runner
        .run_summary_cycle(2, 1, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.succeeded[0].previous_prompt_version, 1);

    let mut conn = pool.acquire().await.unwrap();
    let history = load_summaries(&mut conn, "P").await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().any(|s| s.prompt_version == 1 && s.summary.as_deref() == Some("v1 summary")));

    let current = load_current_summary(&mut conn, "P").await.unwrap().unwrap();
    assert_eq!(current.prompt_version, 2);

    assert!(select_candidates(&mut conn, &SelectionCriteria::new(2, 10))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_cancelled_before_start_processes_nothing() {
    let (_temp_dir, pool) = create_test_db().await;
    seed(&pool, "P", "本文").await;

    let generator = Arc::new(ScriptedGenerator::new());
    let runner = JobRunner::new(pool.clone(), generator.clone(), &fast_config());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = runner.run_summary_cycle(2, 1, &cancel).await.unwrap();

    assert!(report.cancelled);
    assert!(!report.is_success());
    assert_eq!(report.attempted, 0);
    assert!(generator.calls().is_empty());
    assert_eq!(count_summaries(&pool, "P").await, 0);
}

/// Fires the cancellation token while returning a valid summary
struct CancellingGenerator {
    cancel: CancellationToken,
}

#[async_trait]
impl SummaryGenerator for CancellingGenerator {
    fn model(&self) -> &str {
        TEST_MODEL
    }

    async fn generate(&self, _transcript: &str) -> Result<String, GenerationError> {
        self.cancel.cancel();
        Ok("## 決議された事項\n要約".to_string())
    }
}

#[tokio::test]
async fn test_cancel_before_commit_rolls_back() {
    let (_temp_dir, pool) = create_test_db().await;
    seed(&pool, "first", "長めの本文です").await;
    seed(&pool, "second", "本文").await;

    let cancel = CancellationToken::new();
    let generator = CancellingGenerator {
        cancel: cancel.clone(),
    };
    let runner = JobRunner::new(pool.clone(), Arc::new(generator), &fast_config());

    let report = runner.run_summary_cycle(2, 10, &cancel).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.attempted, 1);
    assert_eq!(report.failed[0].kind, FailureKind::Cancelled);
    assert_eq!(report.failed[0].phase, CandidatePhase::Committing);
    assert_eq!(count_summaries(&pool, "first").await, 0);
    assert_eq!(count_summaries(&pool, "second").await, 0);
}

#[tokio::test]
async fn test_invalid_arguments_are_rejected() {
    let (_temp_dir, pool) = create_test_db().await;
    let runner = JobRunner::new(pool, Arc::new(ScriptedGenerator::new()), &fast_config());
    let cancel = CancellationToken::new();

    assert!(matches!(
        runner.run_summary_cycle(0, 1, &cancel).await,
        Err(SummaryError::InvalidArgument(_))
    ));
    assert!(matches!(
        runner.run_summary_cycle(2, 0, &cancel).await,
        Err(SummaryError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_closed_pool_aborts_cycle() {
    let (_temp_dir, pool) = create_test_db().await;
    seed(&pool, "P", "本文").await;

    let runner = JobRunner::new(pool.clone(), Arc::new(ScriptedGenerator::new()), &fast_config());
    pool.close().await;

    let report = runner
        .run_summary_cycle(2, 1, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(
        report.aborted.as_ref().map(|a| a.kind),
        Some(FailureKind::StorageConnectivity)
    );
    assert_eq!(report.attempted, 0);
}

/// Records when each transcript reaches the generator; rejects transcripts
/// containing `reject`
struct TimedGenerator {
    reject: &'static str,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl TimedGenerator {
    fn new(reject: &'static str) -> Self {
        Self {
            reject,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn call_times(&self) -> Vec<(String, Instant)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SummaryGenerator for TimedGenerator {
    fn model(&self) -> &str {
        TEST_MODEL
    }

    async fn generate(&self, transcript: &str) -> Result<String, GenerationError> {
        self.calls
            .lock()
            .unwrap()
            .push((transcript.to_string(), Instant::now()));
        if transcript.contains(self.reject) {
            return Err(GenerationError::FatalUpstream {
                reason: "HTTP 400".to_string(),
            });
        }
        Ok("## 決議された事項\n要約".to_string())
    }
}

#[tokio::test]
async fn test_pause_follows_commits_only() {
    let (_temp_dir, pool) = create_test_db().await;
    seed(&pool, "first", "AAAAAAAA").await;
    seed(&pool, "second", "REJECT").await;
    seed(&pool, "third", "CCCC").await;
    seed(&pool, "fourth", "DDD").await;

    let mut config = fast_config();
    config.inter_candidate_delay_secs = 1;
    let pause = Duration::from_secs(1);

    let generator = Arc::new(TimedGenerator::new("REJECT"));
    let runner = JobRunner::new(pool.clone(), generator.clone(), &config);

    let report = runner
        .run_summary_cycle(2, 10, &CancellationToken::new())
        .await
        .unwrap();
    let finished = Instant::now();

    assert!(report.is_success());
    assert_eq!(report.succeeded.len(), 3);
    assert_eq!(report.failed_ids(), vec!["second"]);

    let calls = generator.call_times();
    let order: Vec<&str> = calls.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(order, vec!["AAAAAAAA", "REJECT", "CCCC", "DDD"]);

    // Committed "first": paused before "second"
    assert!(calls[1].1 - calls[0].1 >= pause);
    // Failed "second": no pause before "third"
    assert!(calls[2].1 - calls[1].1 < pause);
    // Committed "third": paused before "fourth"
    assert!(calls[3].1 - calls[2].1 >= pause);
    // Last candidate: cycle returns without pausing
    assert!(finished - calls[3].1 < pause);
}

#[tokio::test]
async fn test_cancel_during_pause_stops_before_next_candidate() {
    let (_temp_dir, pool) = create_test_db().await;
    seed(&pool, "first", "AAAAAAAA").await;
    seed(&pool, "second", "BBBB").await;

    let mut config = fast_config();
    config.inter_candidate_delay_secs = 300;

    let generator = Arc::new(TimedGenerator::new("never"));
    let runner = JobRunner::new(pool.clone(), generator.clone(), &config);
    let cancel = CancellationToken::new();

    // Cancel once the first summary is committed, i.e. while the runner pauses
    let watcher = {
        let pool = pool.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            while count_summaries(&pool, "first").await == 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            cancel.cancel();
        })
    };

    let report = tokio::time::timeout(
        Duration::from_secs(30),
        runner.run_summary_cycle(2, 10, &cancel),
    )
    .await
    .expect("pause should end on cancellation")
    .unwrap();
    watcher.await.unwrap();

    assert!(report.cancelled);
    assert!(!report.is_success());
    assert_eq!(report.attempted, 1);
    assert_eq!(report.succeeded.len(), 1);
    assert!(report.failed.is_empty());
    assert_eq!(generator.call_times().len(), 1);
    assert_eq!(count_summaries(&pool, "first").await, 1);
    assert_eq!(count_summaries(&pool, "second").await, 0);
}
