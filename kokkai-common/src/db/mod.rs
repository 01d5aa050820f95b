//! Database layer shared by ingestion and summarization
//!
//! Proceedings (`meetings`) and utterances (`speeches`) are written by the
//! ingestion side; `summaries` rows are appended by the summary scheduler.

pub mod init;
pub mod models;

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Open a pool on an existing database.
///
/// Never creates the file or any table: schema ownership stays with
/// [`init::init_database`].
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    debug!("Connecting to database: {}", database_url);

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(false)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(options)
        .await?;

    Ok(pool)
}
