//! Chat-completions client with a small retry budget.
//!
//! Talks to Gemini's OpenAI-compatible endpoint; the API key comes from
//! `GEMINI_API_KEY`. A missing key disables model-assisted paths but
//! never fails the run.

use crate::llm::parse::truncate_str;
use anyhow::{anyhow, Context, Result};
use devpost_adapters::util::debug_log;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const GEMINI_OPENAI_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions";

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000;
const BACKOFF_MULTIPLIER: u64 = 2;
const TRANSIENT_RETRY_DELAY_MS: u64 = 1500;
const REQUEST_TIMEOUT_SECS: u64 = 60;
const MAX_RESPONSE_TOKENS: u32 = 8192;

/// Maximum length for response content echoed into error messages.
const MAX_ERROR_CONTENT_LEN: usize = 200;

/// Get the configured API key, if any.
pub fn api_key() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty())
}

/// Whether model-assisted grouping and fixing are available.
pub fn is_available() -> bool {
    api_key().is_some()
}

/// Sanitize API response content for error messages so credentials or
/// echoed secrets never land in terminal output.
fn sanitize_api_response(content: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &["api_key", "apikey", "secret", "password", "bearer", "token"];

    let truncated = truncate_str(content, MAX_ERROR_CONTENT_LEN);
    let lower = truncated.to_lowercase();
    for pattern in SECRET_PATTERNS {
        if lower.contains(pattern) {
            return "(response details redacted - may contain sensitive data)".to_string();
        }
    }
    truncated
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    /// Content can be null when the provider refuses or errors.
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

/// Extract a retry-after hint from a rate-limit response body.
fn parse_retry_after(text: &str) -> Option<u64> {
    let text_lower = text.to_lowercase();
    let pos = text_lower.find("retry")?;
    for word in text_lower[pos..].split_whitespace().skip(1).take(5) {
        if let Ok(secs) = word.trim_matches(|c: char| !c.is_numeric()).parse::<u64>() {
            if secs > 0 && secs < 300 {
                return Some(secs);
            }
        }
    }
    None
}

fn backoff_secs(retry_count: u32) -> u64 {
    let factor = BACKOFF_MULTIPLIER.pow(retry_count.saturating_sub(1));
    let ms = INITIAL_BACKOFF_MS.saturating_mul(factor);
    (ms / 1000).max(1)
}

fn is_retryable_network_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// A configured model endpoint.
pub struct ModelClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl ModelClient {
    /// Build a client for `model`, or `None` when no key is configured.
    pub fn from_env(model: &str) -> Option<Self> {
        let api_key = api_key()?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("devpost-upgrade/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .ok()?;
        Some(Self {
            http,
            api_key,
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One system+user completion, with the built-in retry budget:
    /// exponential backoff on rate limits, a short fixed delay on other
    /// transient failures.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            max_tokens: MAX_RESPONSE_TOKENS,
            stream: false,
        };

        debug_log(format!(
            "model request: {} chars system, {} chars user",
            system.len(),
            user.len()
        ));

        let mut last_error: Option<anyhow::Error> = None;
        for attempt in 1..=MAX_RETRIES {
            match self.send_once(&request).await {
                Ok(content) => return Ok(content),
                Err(RequestError::RateLimited { retry_after, body }) => {
                    let wait = retry_after.unwrap_or_else(|| backoff_secs(attempt));
                    debug_log(format!(
                        "model rate limited (attempt {}/{}), waiting {}s",
                        attempt, MAX_RETRIES, wait
                    ));
                    last_error = Some(anyhow!("Rate limited: {}", sanitize_api_response(&body)));
                    if attempt < MAX_RETRIES {
                        tokio::time::sleep(Duration::from_secs(wait)).await;
                    }
                }
                Err(RequestError::Transient(err)) => {
                    debug_log(format!(
                        "model transient error (attempt {}/{}): {}",
                        attempt, MAX_RETRIES, err
                    ));
                    last_error = Some(err);
                    if attempt < MAX_RETRIES {
                        tokio::time::sleep(Duration::from_millis(TRANSIENT_RETRY_DELAY_MS)).await;
                    }
                }
                Err(RequestError::Fatal(err)) => return Err(err),
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("Model request failed")))
    }

    async fn send_once(&self, request: &ChatRequest) -> std::result::Result<String, RequestError> {
        let response = self
            .http
            .post(GEMINI_OPENAI_URL)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|err| {
                if is_retryable_network_error(&err) {
                    RequestError::Transient(anyhow!("Network error: {}", err))
                } else {
                    RequestError::Fatal(anyhow!("Request failed: {}", err))
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let body = response.text().await.unwrap_or_default();
            let retry_after = parse_retry_after(&body);
            return Err(RequestError::RateLimited { retry_after, body });
        }
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(RequestError::Transient(anyhow!(
                "Server error {}: {}",
                status,
                sanitize_api_response(&body)
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RequestError::Fatal(anyhow!(
                "Model API returned {}: {}",
                status,
                sanitize_api_response(&body)
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse model response")
            .map_err(RequestError::Fatal)?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RequestError::Fatal(anyhow!("Model response had no choices")))?;

        if let Some(refusal) = choice.message.refusal {
            return Err(RequestError::Fatal(anyhow!(
                "Model refused: {}",
                sanitize_api_response(&refusal)
            )));
        }
        match choice.message.content {
            Some(content) if !content.trim().is_empty() => Ok(content),
            _ => Err(RequestError::Transient(anyhow!(
                "Model returned empty content"
            ))),
        }
    }
}

enum RequestError {
    RateLimited { retry_after: Option<u64>, body: String },
    Transient(anyhow::Error),
    Fatal(anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_exponentially() {
        assert_eq!(backoff_secs(1), 2);
        assert_eq!(backoff_secs(2), 4);
        assert_eq!(backoff_secs(3), 8);
        assert_eq!(backoff_secs(0), 2);
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("Please retry after 30 seconds"), Some(30));
        assert_eq!(parse_retry_after("retry in 5s"), Some(5));
        assert_eq!(parse_retry_after("quota exceeded"), None);
        // Implausible waits are ignored.
        assert_eq!(parse_retry_after("retry after 100000 seconds"), None);
    }

    #[test]
    fn test_sanitize_redacts_secrets() {
        assert_eq!(
            sanitize_api_response("your api_key is invalid"),
            "(response details redacted - may contain sensitive data)"
        );
        let clean = sanitize_api_response("model overloaded");
        assert_eq!(clean, "model overloaded");
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "x".repeat(500);
        assert!(sanitize_api_response(&long).len() <= MAX_ERROR_CONTENT_LEN + 3);
    }
}
