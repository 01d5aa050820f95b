//! Gemini API client
//!
//! Sends the summarization prompt and the assembled transcript in a single
//! `generateContent` request and maps failures onto [`GenerationError`]:
//! - 503 (overloaded) → retryable, no hint
//! - 429 (rate limited) → retryable, `RetryInfo.retryDelay` hint when present
//! - any other error status → fatal
//! - transport errors and undecodable bodies → unexpected

use super::generation::{GenerationError, SummaryGenerator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const USER_AGENT: &str = concat!("kokkai-summary/", env!("CARGO_PKG_VERSION"));

/// Longest slice of an error body echoed into failure reasons
const MAX_REASON_CHARS: usize = 300;

/// Upper bound on an upstream `retryDelay` hint
pub const MAX_RETRY_HINT: Duration = Duration::from_secs(3600);

/// Default summarization prompt. The first heading of the template doubles
/// as the section marker the summary writer trims to.
pub const DEFAULT_PROMPT: &str = r#"
下記要約テンプレートに従って、会議録全体を要約してください。

## 要約テンプレート

```markdown
## 決議された事項

* （決議事項）

## 議論となった事項

---

### 【（質疑のテーマ）】

**質疑者:** （氏名・所属）

**答弁者:** （氏名・役職）

#### 【質疑の要点】

* （質疑のポイント）

#### 【答弁の要点】

* （答弁のポイント）

#### 【議論の結論】

（議論の結果を簡潔に記述）
```
"#;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    status: Option<String>,
    #[serde(default)]
    details: Vec<serde_json::Value>,
}

// ============================================================================
// Client
// ============================================================================

/// Gemini API client settings
#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub model: String,
    pub prompt: String,
    pub base_url: String,
    pub request_timeout: Duration,
}

/// Gemini `generateContent` client
pub struct GeminiClient {
    http_client: reqwest::Client,
    settings: GeminiSettings,
}

impl GeminiClient {
    pub fn new(settings: GeminiSettings) -> Result<Self, GenerationError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| GenerationError::Unexpected {
                detail: format!("HTTP client setup failed: {}", e),
            })?;

        Ok(Self {
            http_client,
            settings,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model
        )
    }
}

#[async_trait]
impl SummaryGenerator for GeminiClient {
    fn model(&self) -> &str {
        &self.settings.model
    }

    async fn generate(&self, transcript: &str) -> Result<String, GenerationError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    RequestPart {
                        text: &self.settings.prompt,
                    },
                    RequestPart { text: transcript },
                ],
            }],
        };

        tracing::debug!(
            model = %self.settings.model,
            transcript_chars = transcript.chars().count(),
            "Requesting summary generation"
        );

        let response = self
            .http_client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.settings.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Unexpected {
                detail: format!("Network error: {}", e),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| GenerationError::Unexpected {
            detail: format!("Failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            let error = classify_error_response(status.as_u16(), &body);
            tracing::warn!(
                status = status.as_u16(),
                retryable = error.is_retryable(),
                "Gemini API returned error status"
            );
            return Err(error);
        }

        let text = extract_text(&body)?;

        tracing::info!(
            model = %self.settings.model,
            summary_chars = text.chars().count(),
            "Summary generated"
        );

        Ok(text)
    }
}

/// Map an error HTTP status and body onto the generation taxonomy
pub fn classify_error_response(status: u16, body: &str) -> GenerationError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();

    let reason = match &envelope {
        Some(envelope) => format!(
            "{} {}: {}",
            status,
            envelope.error.status.as_deref().unwrap_or("UNKNOWN"),
            envelope.error.message
        ),
        None => format!("{}: {}", status, truncate(body, MAX_REASON_CHARS)),
    };

    match status {
        503 => GenerationError::RetryableUpstream {
            reason,
            suggested_delay: None,
        },
        429 => GenerationError::RetryableUpstream {
            reason,
            suggested_delay: envelope
                .as_ref()
                .and_then(|e| retry_delay_hint(&e.error.details)),
        },
        _ => GenerationError::FatalUpstream { reason },
    }
}

/// First `retryDelay` found in the error details
fn retry_delay_hint(details: &[serde_json::Value]) -> Option<Duration> {
    details
        .iter()
        .filter_map(|d| d.get("retryDelay").and_then(|v| v.as_str()))
        .find_map(parse_retry_delay)
}

/// Parse a protobuf JSON duration such as `"34s"` or `"1.5s"`, clamped to
/// [`MAX_RETRY_HINT`]
pub fn parse_retry_delay(value: &str) -> Option<Duration> {
    let seconds = value.trim().strip_suffix('s')?;
    let seconds: f64 = seconds.parse().ok()?;
    if seconds.is_nan() || seconds < 0.0 {
        return None;
    }
    let delay = Duration::try_from_secs_f64(seconds).unwrap_or(MAX_RETRY_HINT);
    Some(delay.min(MAX_RETRY_HINT))
}

/// Concatenate the text parts of the first candidate
fn extract_text(body: &str) -> Result<String, GenerationError> {
    let response: GenerateContentResponse =
        serde_json::from_str(body).map_err(|e| GenerationError::Unexpected {
            detail: format!("Parse error: {}", e),
        })?;

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::Unexpected {
            detail: "Response contained no candidates".to_string(),
        })?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(GenerationError::Unexpected {
            detail: format!(
                "Candidate had no text (finishReason: {})",
                candidate.finish_reason.as_deref().unwrap_or("none")
            ),
        });
    }

    Ok(text)
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
