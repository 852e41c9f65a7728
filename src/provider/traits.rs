use crate::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single request to the reasoning backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Ask the backend to constrain its reply to one JSON object.
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            json_mode: false,
        }
    }
}

/// The assistant's text reply plus its metadata envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub metadata: CompletionMetadata,
}

/// The core backend trait. Implement this for each text-completion service.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    async fn complete(
        &self,
        request: CompletionRequest,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<Completion, BackendError>;
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Auth error: {0}")]
    Auth(String),
    #[error("Rate limited, retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },
    /// Malformed or oversized request (usually the context outgrew the model window).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(String),
}
