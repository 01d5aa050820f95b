//! kokkai-summary - Diet proceedings summarization scheduler
//!
//! Runs one scheduling cycle: selects proceedings whose summary is missing
//! or older than the target prompt version, generates new summaries and
//! appends them to the database.
//!
//! Exit status is 0 when the cycle completed (individual candidates may
//! still have failed) and 1 when it was aborted or cancelled.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use kokkai_common::config::{load_toml_config, resolve_database_url};
use kokkai_summary::config::{resolve_api_key, SummaryConfig, CONFIG_FILE_NAME};
use kokkai_summary::db::load_current_summary;
use kokkai_summary::services::GeminiClient;
use kokkai_summary::JobRunner;

#[derive(Debug, Parser)]
#[command(name = "kokkai-summary", version, about = "Summarize Diet proceedings with an LLM")]
struct Cli {
    /// Config file (default: ~/.config/kokkai/summary.toml)
    #[arg(long, env = "KOKKAI_SUMMARY_CONFIG")]
    config: Option<PathBuf>,

    /// Database URL (overrides secrets, environment and config file)
    #[arg(long)]
    database_url: Option<String>,

    /// Prompt version to bring proceedings up to
    #[arg(long)]
    target_prompt_version: Option<i64>,

    /// Maximum number of proceedings to summarize in this run
    #[arg(long)]
    batch_size: Option<usize>,

    /// Model identifier
    #[arg(long)]
    model: Option<String>,

    /// Only consider proceedings of this legislative session
    #[arg(long)]
    session: Option<i64>,

    /// Seconds to wait after each committed summary
    #[arg(long)]
    inter_candidate_delay: Option<u64>,

    /// Generation attempts per proceeding (first try included)
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Print the current summary of one proceeding and exit
    #[arg(long, value_name = "ISSUE_ID")]
    show: Option<String>,
}

impl Cli {
    fn apply_to(&self, config: &mut SummaryConfig) {
        if let Some(version) = self.target_prompt_version {
            config.target_prompt_version = version;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(session) = self.session {
            config.session = Some(session);
        }
        if let Some(delay) = self.inter_candidate_delay {
            config.inter_candidate_delay_secs = delay;
        }
        if let Some(max_attempts) = self.max_attempts {
            config.retry.max_attempts = max_attempts;
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting kokkai-summary v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();

    let mut config: SummaryConfig = load_toml_config(cli.config.as_deref(), CONFIG_FILE_NAME)?;
    cli.apply_to(&mut config);
    config.validate()?;

    let database_url = resolve_database_url(cli.database_url.as_deref(), config.database_url.as_deref());
    let pool = kokkai_common::db::connect(&database_url)
        .await
        .with_context(|| format!("Failed to connect to database {}", database_url))?;
    info!("Connected to database");

    if let Some(issue_id) = &cli.show {
        let mut conn = pool.acquire().await?;
        match load_current_summary(&mut conn, issue_id).await? {
            Some(summary) => {
                info!(
                    issue_id = %summary.issue_id,
                    model = %summary.model,
                    prompt_version = summary.prompt_version,
                    updated = %summary.update_time,
                    "Current summary"
                );
                println!("{}", summary.summary.unwrap_or_default());
                return Ok(ExitCode::SUCCESS);
            }
            None => {
                warn!(%issue_id, "No summary found");
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    let api_key = resolve_api_key(config.api_key.as_deref())?;
    let generator = GeminiClient::new(config.gemini_settings(api_key)?)?;
    let runner = JobRunner::new(pool.clone(), Arc::new(generator), &config);

    info!(
        model = %config.model,
        target_prompt_version = config.target_prompt_version,
        batch_size = config.batch_size,
        max_attempts = config.retry.max_attempts,
        "Scheduler configured"
    );

    // Ctrl-C cancels the cycle at the next suspension point
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling summary cycle");
            signal_token.cancel();
        }
    });

    let report = runner
        .run_summary_cycle(config.target_prompt_version, config.batch_size, &cancel)
        .await?;

    pool.close().await;

    for failure in &report.failed {
        error!(
            issue_id = %failure.issue_id,
            phase = %failure.phase,
            kind = %failure.kind,
            reason = %failure.reason,
            "Failed proceeding"
        );
    }

    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.is_success() {
        info!(
            attempted = report.attempted,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Cycle completed"
        );
        Ok(ExitCode::SUCCESS)
    } else {
        error!(
            aborted = ?report.aborted,
            cancelled = report.cancelled,
            "Cycle did not complete"
        );
        Ok(ExitCode::FAILURE)
    }
}
