//! Chat-completion client for grounded answer generation
//!
//! Thin OpenAI-compatible client with a typed error taxonomy so the
//! answer pipeline can decide between retry, correction and extractive
//! fallback without string-matching upstream failures.

use crate::config::LlmConfig;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// System prompt sent with every answer generation request
pub const SYSTEM_PROMPT: &str = "You are a technical research assistant. \
Only use provided evidence. If insufficient evidence, say so.";

/// One retrieved chunk as presented to the model. Values are strings on
/// the wire, including the 1-based citation id.
#[derive(Debug, Clone, Serialize)]
pub struct ContextRecord {
    pub citation_id: String,
    pub source: String,
    pub paper_title: String,
    pub chunk_text: String,
}

/// Typed LLM failure. `retryable()` drives the retry loop; `code()` is
/// the stable identifier carried into logs and error payloads.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("OPENAI_API_KEY is required to use OpenAI answers.")]
    MissingApiKey,

    #[error("OPENAI_MODEL cannot be empty.")]
    MissingModel,

    #[error("LLM timeout must be greater than 0.")]
    InvalidTimeout,

    #[error("At least one context block is required.")]
    MissingContext,

    #[error("Chat completion returned empty content.")]
    EmptyResponse,

    #[error("{message}")]
    Upstream { status: u16, message: String },

    #[error("{message}")]
    Timeout { message: String },

    #[error("{message}")]
    Connection { message: String },
}

const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];
const REQUEST_ERROR_STATUSES: [u16; 5] = [400, 401, 403, 404, 422];

impl LlmError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingApiKey => "missing_api_key",
            Self::MissingModel => "missing_model",
            Self::InvalidTimeout => "invalid_timeout",
            Self::MissingContext => "missing_context",
            Self::EmptyResponse => "empty_response",
            Self::Upstream { status, .. } => {
                if RETRYABLE_STATUSES.contains(status) {
                    "upstream_retryable"
                } else if REQUEST_ERROR_STATUSES.contains(status) {
                    "upstream_request_error"
                } else {
                    "upstream_error"
                }
            }
            Self::Timeout { .. } => "timeout",
            Self::Connection { .. } => "connection_error",
        }
    }

    pub fn retryable(&self) -> bool {
        match self {
            Self::Upstream { status, .. } => RETRYABLE_STATUSES.contains(status),
            Self::Timeout { .. } | Self::Connection { .. } => true,
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn map_request_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout {
            message: format!("LLM request timed out: {}", e),
        }
    } else if e.is_connect() {
        LlmError::Connection {
            message: format!("LLM connection failed: {}", e),
        }
    } else {
        LlmError::Upstream {
            status: 0,
            message: format!("LLM request failed: {}", e),
        }
    }
}

const OUTPUT_CONTRACT: &str = r#"REQUIRED OUTPUT JSON:
{
  "answer": "...",
  "key_points": ["...", "..."],
  "evidence_used": [
    {"source": "...", "reason": "..."}
  ],
  "confidence": "high | medium | low",
  "limitations": "..."
}
Rules: Use only provided evidence, do not hallucinate, and output valid JSON only."#;

/// Build the user prompt for one generation attempt
pub fn build_user_prompt(
    query: &str,
    context: &[ContextRecord],
    correction: Option<&str>,
) -> String {
    let context_json = serde_json::to_string(context).unwrap_or_else(|_| "[]".to_string());

    let mut prompt = format!(
        "USER INPUT:\nQuestion: {}\nRetrieved context (JSON array of chunks):\n{}\n\n{}",
        query, context_json, OUTPUT_CONTRACT
    );

    if let Some(correction) = correction {
        prompt.push_str(&format!("\n\nCorrection: {}", correction));
    }

    prompt
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

/// OpenAI-compatible chat client
pub struct LlmClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_retries: u32,
    backoff_secs: f64,
}

impl LlmClient {
    /// Build a client from configuration. A missing API key is reported
    /// as `MissingApiKey` so callers can choose the extractive path.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(LlmError::MissingApiKey)?
            .to_string();

        let model = config.model.trim();
        if model.is_empty() {
            return Err(LlmError::MissingModel);
        }

        if config.timeout_secs == 0 {
            return Err(LlmError::InvalidTimeout);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model: model.to_string(),
            base_url: config
                .api_base
                .as_deref()
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .unwrap_or("https://api.openai.com/v1")
                .to_string(),
            temperature: config.temperature,
            max_retries: config.max_retries,
            backoff_secs: config.backoff_secs,
        })
    }

    /// Generate an answer string for the query over the given context,
    /// retrying retryable upstream failures with exponential backoff.
    pub async fn generate(
        &self,
        query: &str,
        context: &[ContextRecord],
        correction: Option<&str>,
    ) -> Result<String, LlmError> {
        if context.is_empty() {
            return Err(LlmError::MissingContext);
        }

        let user_prompt = build_user_prompt(query, context, correction);

        for attempt in 0..=self.max_retries {
            match self.request_completion(&user_prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.retryable() && attempt < self.max_retries => {
                    let delay = retry_delay(self.backoff_secs, attempt);
                    tracing::warn!(
                        code = e.code(),
                        status = ?e.status(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "LLM request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(LlmError::Upstream {
            status: 0,
            message: "LLM request failed after retries.".to_string(),
        })
    }

    async fn request_completion(&self, user_prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatRequest {
            model: self.model.clone(),
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt.to_string(),
                },
            ],
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Upstream {
                status: status.as_u16(),
                message: format!("LLM API error {}: {}", status, body),
            });
        }

        let chat: ChatResponse = response.json().await.map_err(|e| LlmError::Upstream {
            status: 0,
            message: format!("Failed to parse LLM response: {}", e),
        })?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        content.ok_or(LlmError::EmptyResponse)
    }
}

fn retry_delay(backoff_secs: f64, attempt: u32) -> Duration {
    let base = backoff_secs * 2_f64.powi(attempt as i32);
    let jitter = rand::thread_rng().gen_range(0.0..0.35);
    Duration::from_secs_f64(base + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key() -> LlmConfig {
        LlmConfig {
            api_key: Some("sk-test".to_string()),
            api_base: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.1,
            timeout_secs: 30,
            max_retries: 3,
            backoff_secs: 1.0,
        }
    }

    #[test]
    fn test_missing_api_key() {
        let mut config = config_with_key();
        config.api_key = None;
        let err = LlmClient::from_config(&config).err().unwrap();
        assert_eq!(err.code(), "missing_api_key");
        assert!(!err.retryable());
    }

    #[test]
    fn test_blank_key_and_model_rejected() {
        let mut config = config_with_key();
        config.api_key = Some("   ".to_string());
        assert_eq!(
            LlmClient::from_config(&config).err().unwrap().code(),
            "missing_api_key"
        );

        let mut config = config_with_key();
        config.model = "".to_string();
        assert_eq!(
            LlmClient::from_config(&config).err().unwrap().code(),
            "missing_model"
        );

        let mut config = config_with_key();
        config.timeout_secs = 0;
        assert_eq!(
            LlmClient::from_config(&config).err().unwrap().code(),
            "invalid_timeout"
        );
    }

    #[test]
    fn test_upstream_status_classification() {
        for status in [429_u16, 500, 502, 503, 504] {
            let err = LlmError::Upstream {
                status,
                message: "boom".to_string(),
            };
            assert_eq!(err.code(), "upstream_retryable");
            assert!(err.retryable());
        }

        for status in [400_u16, 401, 403, 404, 422] {
            let err = LlmError::Upstream {
                status,
                message: "boom".to_string(),
            };
            assert_eq!(err.code(), "upstream_request_error");
            assert!(!err.retryable());
        }

        let odd = LlmError::Upstream {
            status: 418,
            message: "boom".to_string(),
        };
        assert_eq!(odd.code(), "upstream_error");
        assert!(!odd.retryable());
    }

    #[test]
    fn test_transport_errors_retryable() {
        let timeout = LlmError::Timeout {
            message: "slow".to_string(),
        };
        let connection = LlmError::Connection {
            message: "refused".to_string(),
        };
        assert!(timeout.retryable());
        assert!(connection.retryable());
        assert_eq!(timeout.code(), "timeout");
        assert_eq!(connection.code(), "connection_error");
    }

    #[test]
    fn test_prompt_shape() {
        let context = vec![ContextRecord {
            citation_id: "1".to_string(),
            source: "[1] W100".to_string(),
            paper_title: "Network Slicing Survey".to_string(),
            chunk_text: "Slicing partitions the RAN.".to_string(),
        }];

        let prompt = build_user_prompt("what is slicing?", &context, None);

        assert!(prompt.starts_with("USER INPUT:\nQuestion: what is slicing?\n"));
        assert!(prompt.contains("Retrieved context (JSON array of chunks):\n[{\"citation_id\":\"1\""));
        assert!(prompt.contains("REQUIRED OUTPUT JSON:"));
        assert!(prompt.contains("\"confidence\": \"high | medium | low\""));
        assert!(prompt
            .ends_with("Rules: Use only provided evidence, do not hallucinate, and output valid JSON only."));
    }

    #[test]
    fn test_prompt_correction_suffix() {
        let context = vec![ContextRecord {
            citation_id: "1".to_string(),
            source: "[1] W100".to_string(),
            paper_title: "T".to_string(),
            chunk_text: "C".to_string(),
        }];

        let prompt = build_user_prompt("q", &context, Some("Return ONLY valid JSON."));
        assert!(prompt.ends_with("\n\nCorrection: Return ONLY valid JSON."));
    }

    #[tokio::test]
    async fn test_generate_requires_context() {
        let client = LlmClient::from_config(&config_with_key()).unwrap();
        let err = client.generate("q", &[], None).await.err().unwrap();
        assert_eq!(err.code(), "missing_context");
    }

    #[test]
    fn test_retry_delay_bounds() {
        for attempt in 0..3 {
            let delay = retry_delay(1.0, attempt).as_secs_f64();
            let base = 2_f64.powi(attempt as i32);
            assert!(delay >= base);
            assert!(delay < base + 0.35);
        }
    }
}
