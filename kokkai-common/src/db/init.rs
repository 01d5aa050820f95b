//! Database initialization
//!
//! Creates the shared proceedings schema. Used by the ingestion side on
//! first run and by tests; the summary scheduler only connects.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;

/// Create (if needed) and open the database file, then create tables
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_tables(&pool).await?;

    Ok(pool)
}

/// Create all tables (idempotent - safe to call multiple times)
pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    create_sessions_table(pool).await?;
    create_meetings_table(pool).await?;
    create_speeches_table(pool).await?;
    create_summaries_table(pool).await?;

    info!("Tables created if they did not exist");
    Ok(())
}

async fn create_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            session INTEGER PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_meetings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meetings (
            issue_id TEXT PRIMARY KEY NOT NULL,
            image_kind TEXT NOT NULL,
            search_object INTEGER NOT NULL,
            session INTEGER NOT NULL,
            name_of_house TEXT NOT NULL,
            name_of_meeting TEXT,
            issue TEXT NOT NULL,
            date TEXT,
            closing TEXT,
            meeting_url TEXT NOT NULL,
            pdf_url TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_meetings_session ON meetings(session)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_speeches_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS speeches (
            speech_id TEXT PRIMARY KEY NOT NULL,
            issue_id TEXT NOT NULL REFERENCES meetings(issue_id),
            speech_order INTEGER NOT NULL,
            speaker TEXT,
            speaker_yomi TEXT,
            speaker_group TEXT,
            speaker_position TEXT,
            speaker_role TEXT,
            speech TEXT,
            start_page INTEGER,
            create_time TEXT,
            update_time TEXT,
            speech_url TEXT NOT NULL,
            UNIQUE (issue_id, speech_order)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_summaries_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS summaries (
            issue_id TEXT NOT NULL REFERENCES meetings(issue_id),
            summary TEXT,
            model TEXT NOT NULL,
            prompt_version INTEGER NOT NULL DEFAULT 1,
            create_time TEXT NOT NULL,
            update_time TEXT NOT NULL,
            PRIMARY KEY (issue_id, model, prompt_version)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
