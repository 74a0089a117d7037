//! Minimal Gemini client for our use-cases.
//!
//! We only call `models/{model}:generateContent` and always request JSON output
//! constrained by a response schema. Calls are instrumented and log model names,
//! latencies, token usage and response sizes (not contents).
//!
//! NOTE: We never log the API key; the key travels in a header, not the URL.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, instrument};

use crate::error::{ConfigError, RequestError};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_FAST_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_STRONG_MODEL: &str = "gemini-2.5-pro";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Which model a call should run on. Paper generation is cheap and fast;
/// grading gets the stronger model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelTier {
  Fast,
  Strong,
}

/// Seam between the exam requests and the text-generation service.
///
/// Implementations return the raw response text; validating it against
/// `schema` is the caller's job.
#[async_trait]
pub trait ExamModel: Send + Sync {
  async fn generate_json(&self, tier: ModelTier, prompt: &str, schema: &Value) -> Result<String, RequestError>;
}

#[derive(Clone)]
pub struct Gemini {
  pub client: reqwest::Client,
  api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
  pub timeout: Duration,
}

impl std::fmt::Debug for Gemini {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Gemini")
      .field("base_url", &self.base_url)
      .field("fast_model", &self.fast_model)
      .field("strong_model", &self.strong_model)
      .field("timeout", &self.timeout)
      .finish_non_exhaustive()
  }
}

impl Gemini {
  /// Build the client from process environment. A missing credential is fatal.
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|var| std::env::var(var).ok())
  }

  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
    let api_key = ["GEMINI_API_KEY", "API_KEY"]
      .iter()
      .filter_map(|var| lookup(var))
      .map(|key| key.trim().to_string())
      .find(|key| !key.is_empty())
      .ok_or(ConfigError::MissingCredential)?;

    let base_url = lookup("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());
    let fast_model = lookup("GEMINI_FAST_MODEL").unwrap_or_else(|| DEFAULT_FAST_MODEL.into());
    let strong_model = lookup("GEMINI_STRONG_MODEL").unwrap_or_else(|| DEFAULT_STRONG_MODEL.into());

    let timeout_secs = match lookup("MODEL_TIMEOUT_SECS") {
      None => DEFAULT_TIMEOUT_SECS,
      Some(raw) => match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => secs,
        _ => return Err(ConfigError::InvalidValue { var: "MODEL_TIMEOUT_SECS", value: raw }),
      },
    };
    let timeout = Duration::from_secs(timeout_secs);

    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(ConfigError::HttpClient)?;

    Ok(Self { client, api_key, base_url, fast_model, strong_model, timeout })
  }

  pub fn model_for(&self, tier: ModelTier) -> &str {
    match tier {
      ModelTier::Fast => &self.fast_model,
      ModelTier::Strong => &self.strong_model,
    }
  }
}

#[async_trait]
impl ExamModel for Gemini {
  #[instrument(level = "info", skip(self, prompt, schema), fields(model = %self.model_for(tier), prompt_len = prompt.len()))]
  async fn generate_json(&self, tier: ModelTier, prompt: &str, schema: &Value) -> Result<String, RequestError> {
    let model = self.model_for(tier);
    let url = format!("{}/models/{}:generateContent", self.base_url.trim_end_matches('/'), model);
    let req = GenerateContentRequest {
      contents: vec![Content {
        role: "user",
        parts: vec![PartReq { text: prompt }],
      }],
      generation_config: GenerationConfig {
        response_mime_type: "application/json",
        response_schema: schema,
      },
    };

    let start = Instant::now();
    let res = self.client.post(&url)
      .header(USER_AGENT, "mockpaper-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header("x-goog-api-key", &self.api_key)
      .json(&req).send().await?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let message = extract_api_error(&body).unwrap_or(body);
      error!(elapsed = ?start.elapsed(), %status, "Gemini call rejected");
      return Err(RequestError::HttpStatus { status, message });
    }

    let body: GenerateContentResponse = res.json().await?;
    if let Some(usage) = &body.usage_metadata {
      info!(prompt_tokens = ?usage.prompt_token_count, candidate_tokens = ?usage.candidates_token_count, total_tokens = ?usage.total_token_count, "Gemini usage");
    }

    let text = response_text(body);
    info!(elapsed = ?start.elapsed(), response_len = text.len(), "Model response received");
    if text.is_empty() {
      return Err(RequestError::EmptyResponse);
    }
    Ok(text)
  }
}

/// Concatenate the text parts of the first candidate.
fn response_text(body: GenerateContentResponse) -> String {
  body.candidates
    .into_iter()
    .next()
    .and_then(|c| c.content)
    .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect::<String>())
    .unwrap_or_default()
    .trim()
    .to_string()
}

// --- generateContent DTOs ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
  contents: Vec<Content<'a>>,
  generation_config: GenerationConfig<'a>,
}
#[derive(Serialize)]
struct Content<'a> { role: &'static str, parts: Vec<PartReq<'a>> }
#[derive(Serialize)]
struct PartReq<'a> { text: &'a str }
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
  response_mime_type: &'static str,
  response_schema: &'a Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
  #[serde(default)] candidates: Vec<Candidate>,
  #[serde(default)] usage_metadata: Option<UsageMetadata>,
}
#[derive(Deserialize)]
struct Candidate { #[serde(default)] content: Option<ContentResp> }
#[derive(Deserialize)]
struct ContentResp { #[serde(default)] parts: Vec<PartResp> }
#[derive(Deserialize)]
struct PartResp { #[serde(default)] text: Option<String> }
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
  #[serde(default)] prompt_token_count: Option<u32>,
  #[serde(default)] candidates_token_count: Option<u32>,
  #[serde(default)] total_token_count: Option<u32>,
}

/// Try to extract a clean error message from a Gemini error body.
fn extract_api_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
