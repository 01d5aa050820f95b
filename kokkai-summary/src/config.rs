//! Configuration for kokkai-summary
//!
//! Loaded from `summary.toml` (see [`kokkai_common::config::load_toml_config`])
//! with command-line overrides applied by `main`. Every component receives
//! its settings from this struct; nothing is read from process-wide state
//! after startup.

use crate::services::gemini_client::{GeminiSettings, DEFAULT_API_BASE_URL, DEFAULT_PROMPT};
use crate::services::retry_controller::RetryPolicy;
use crate::services::summary_writer::DEFAULT_SECTION_MARKER;
use kokkai_common::config::resolve_secret;
use kokkai_common::db::models::FULL_TRANSCRIPT_KIND;
use kokkai_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Default config file name under `~/.config/kokkai/`
pub const CONFIG_FILE_NAME: &str = "summary.toml";

/// Secret holding the Gemini API key (`/run/secrets/gemini_api_key` or `GEMINI_API_KEY`)
pub const API_KEY_SECRET: &str = "gemini_api_key";

/// Summary scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Database URL; falls back to the `database_url` secret and the default path
    pub database_url: Option<String>,
    /// Gemini API key; the secret file / environment variable wins when both are set
    pub api_key: Option<String>,
    /// Prompt version written on new summaries; older versions are re-summarized
    pub target_prompt_version: i64,
    /// Maximum candidates per cycle
    pub batch_size: usize,
    /// Model identifier
    pub model: String,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    /// Pause after each committed summary
    pub inter_candidate_delay_secs: u64,
    /// Heading that starts the templated output
    pub section_marker: String,
    /// Meeting kind that carries full transcripts
    pub meeting_kind: String,
    /// Restrict selection to one legislative session
    pub session: Option<i64>,
    /// Prompt template file; the built-in template is used when unset
    pub prompt_file: Option<PathBuf>,
    pub retry: RetryPolicy,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            api_key: None,
            target_prompt_version: 2,
            batch_size: 1,
            model: "gemini-2.5-flash".to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: 600,
            inter_candidate_delay_secs: 10,
            section_marker: DEFAULT_SECTION_MARKER.to_string(),
            meeting_kind: FULL_TRANSCRIPT_KIND.to_string(),
            session: None,
            prompt_file: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl SummaryConfig {
    /// Reject settings the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.target_prompt_version < 1 {
            return Err(Error::Config(format!(
                "target_prompt_version must be >= 1 (got {})",
                self.target_prompt_version
            )));
        }
        if self.batch_size < 1 {
            return Err(Error::Config("batch_size must be >= 1".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(Error::Config("model must not be empty".to_string()));
        }
        if self.meeting_kind.trim().is_empty() {
            return Err(Error::Config("meeting_kind must not be empty".to_string()));
        }
        if self.retry.max_attempts < 1 {
            return Err(Error::Config("retry.max_attempts must be >= 1".to_string()));
        }
        if self.retry.backoff_base_secs > self.retry.backoff_cap_secs {
            return Err(Error::Config(format!(
                "retry.backoff_base_secs ({}) exceeds retry.backoff_cap_secs ({})",
                self.retry.backoff_base_secs, self.retry.backoff_cap_secs
            )));
        }
        Ok(())
    }

    pub fn inter_candidate_delay(&self) -> Duration {
        Duration::from_secs(self.inter_candidate_delay_secs)
    }

    /// Prompt text: `prompt_file` contents or the built-in template
    pub fn load_prompt(&self) -> Result<String> {
        match &self.prompt_file {
            Some(path) => {
                let prompt = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Read prompt file {} failed: {}", path.display(), e))
                })?;
                if prompt.trim().is_empty() {
                    return Err(Error::Config(format!(
                        "Prompt file {} is empty",
                        path.display()
                    )));
                }
                Ok(prompt)
            }
            None => Ok(DEFAULT_PROMPT.to_string()),
        }
    }

    /// Generation client settings with the resolved API key
    pub fn gemini_settings(&self, api_key: String) -> Result<GeminiSettings> {
        Ok(GeminiSettings {
            api_key,
            model: self.model.clone(),
            prompt: self.load_prompt()?,
            base_url: self.api_base_url.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        })
    }
}

/// Resolve the Gemini API key
///
/// **Priority:** secret file / environment → TOML
pub fn resolve_api_key(toml_key: Option<&str>) -> Result<String> {
    resolve_api_key_from(resolve_secret(API_KEY_SECRET), toml_key)
}

fn resolve_api_key_from(secret_key: Option<String>, toml_key: Option<&str>) -> Result<String> {
    let toml_key = toml_key.filter(|k| is_valid_key(k));

    if secret_key.is_some() && toml_key.is_some() {
        warn!("Gemini API key found in both secrets/environment and TOML. Using secrets/environment.");
    }

    if let Some(key) = secret_key.filter(|k| is_valid_key(k)) {
        info!("Gemini API key loaded from secrets/environment");
        return Ok(key);
    }

    if let Some(key) = toml_key {
        info!("Gemini API key loaded from TOML config");
        return Ok(key.trim().to_string());
    }

    Err(Error::MissingSecret(API_KEY_SECRET.to_string()))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
