//! OpenAI Chat Completions compatible backend.
//!
//! Covers Groq, OpenAI, OpenRouter, and any other service exposing
//! `POST {base_url}/chat/completions`. Replies are requested non-streamed:
//! the engine needs the whole JSON action before it can act.

use super::traits::*;
use crate::types::*;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

pub struct OpenAiCompatBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatBackend {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Build from `GROQ_API_KEY` and optional `GROQ_BASE_URL`.
    pub fn from_env() -> Result<Self, BackendError> {
        let api_key = std::env::var("GROQ_API_KEY")
            .map_err(|_| BackendError::Auth("GROQ_API_KEY is not set".into()))?;
        let base_url =
            std::env::var("GROQ_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Ok(Self::new(base_url, api_key))
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl ReasoningBackend for OpenAiCompatBackend {
    async fn complete(
        &self,
        request: CompletionRequest,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<Completion, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = build_request_body(&request);
        debug!("OpenAI compat request: model={} url={}", request.model, url);

        let started = Instant::now();
        let send = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(BackendError::Cancelled),
            r = send => r.map_err(|e| BackendError::Network(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<f64>().ok())
                .map(|secs| (secs * 1000.0) as u64);
            let text = response.text().await.unwrap_or_default();
            warn!("OpenAI compat error status={} body={}", status, text);
            return Err(classify_status(status.as_u16(), text, retry_after_ms));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Api(format!("invalid response body: {}", e)))?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BackendError::Api("response contained no message content".into()))?;

        let usage = parsed
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
                reasoning_tokens: u
                    .completion_tokens_details
                    .map(|d| d.reasoning_tokens)
                    .unwrap_or_default(),
            })
            .unwrap_or_default();

        Ok(Completion {
            text,
            metadata: CompletionMetadata {
                id: parsed.id,
                model: parsed.model.unwrap_or(request.model),
                usage,
                latency_ms,
            },
        })
    }
}

/// Map an HTTP failure onto the engine's recovery taxonomy.
fn classify_status(status: u16, body: String, retry_after_ms: Option<u64>) -> BackendError {
    match status {
        429 => BackendError::RateLimited { retry_after_ms },
        400 | 413 | 422 => BackendError::InvalidRequest(body),
        401 | 403 => BackendError::Auth(body),
        500..=599 => BackendError::Network(format!("HTTP {}: {}", status, body)),
        _ => BackendError::Api(format!("HTTP {}: {}", status, body)),
    }
}

fn build_request_body(request: &CompletionRequest) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": request.model,
        "stream": false,
        "messages": request.messages,
    });

    if request.json_mode {
        body["response_format"] = serde_json::json!({"type": "json_object"});
    }
    if let Some(max) = request.max_tokens {
        body["max_tokens"] = serde_json::json!(max);
    }
    if let Some(temp) = request.temperature {
        body["temperature"] = serde_json::json!(temp);
    }

    body
}

// OpenAI response types
#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
    #[serde(default)]
    completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Deserialize)]
struct CompletionTokensDetails {
    #[serde(default)]
    reasoning_tokens: u64,
}
