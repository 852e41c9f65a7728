//! Mock backend for testing. No real API calls.

use super::traits::*;
use crate::types::*;
use async_trait::async_trait;
use std::sync::Mutex;

/// A scripted reply: raw text, a well-formed action, or an error.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Action(Action),
    Error(BackendError),
}

impl MockReply {
    /// Convenience: `{"name": name, "arguments": arguments}` as an action reply.
    pub fn action(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        let arguments = match arguments {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self::Action(Action::new(name, arguments))
    }

    pub fn final_answer(answer: impl Into<String>) -> Self {
        Self::Action(Action::final_answer(answer))
    }
}

/// Mock reasoning backend for tests. Supply a sequence of replies; every
/// request it receives is recorded for later inspection.
///
/// Once the script is exhausted every call fails with `BackendError::Other`,
/// which the engine treats as fatal, so a runaway test terminates.
pub struct MockBackend {
    replies: Mutex<Vec<MockReply>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockBackend {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Convenience: sequence of raw text replies
    pub fn texts(texts: Vec<impl Into<String>>) -> Self {
        Self::new(texts.into_iter().map(|t| MockReply::Text(t.into())).collect())
    }

    /// All requests received so far, in call order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[async_trait]
impl ReasoningBackend for MockBackend {
    async fn complete(
        &self,
        request: CompletionRequest,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<Completion, BackendError> {
        if cancel.is_cancelled() {
            return Err(BackendError::Cancelled);
        }

        let model = request.model.clone();
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let reply = match self.replies.lock() {
            Ok(mut replies) if !replies.is_empty() => replies.remove(0),
            _ => return Err(BackendError::Other("no more mock replies".into())),
        };

        let text = match reply {
            MockReply::Text(text) => text,
            MockReply::Action(action) => serde_json::to_string(&action)
                .map_err(|e| BackendError::Other(e.to_string()))?,
            MockReply::Error(e) => return Err(e),
        };

        Ok(Completion {
            metadata: CompletionMetadata {
                id: None,
                model,
                usage: Usage::default(),
                latency_ms: 0,
            },
            text,
        })
    }
}
