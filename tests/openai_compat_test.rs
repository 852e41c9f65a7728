//! HTTP tests for the OpenAI-compatible backend against a local mock server.

use hieragent::provider::{BackendError, CompletionRequest, OpenAiCompatBackend, ReasoningBackend};
use hieragent::*;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request() -> CompletionRequest {
    let mut request = CompletionRequest::new(
        "llama-3.3-70b-versatile",
        vec![ChatMessage::system("sys"), ChatMessage::user("Task: hi")],
    );
    request.json_mode = true;
    request
}

#[tokio::test]
async fn test_successful_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "llama-3.3-70b-versatile",
            "stream": false,
            "response_format": {"type": "json_object"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-42",
            "model": "llama-3.3-70b-versatile",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "{\"name\": \"final_answer\", \"arguments\": {\"answer\": \"hi\"}}"
                }
            }],
            "usage": {
                "prompt_tokens": 20,
                "completion_tokens": 10,
                "total_tokens": 30,
                "completion_tokens_details": {"reasoning_tokens": 4}
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = OpenAiCompatBackend::new(server.uri(), "test-key");
    let completion = backend
        .complete(request(), CancellationToken::new())
        .await
        .unwrap();

    assert!(completion.text.contains("final_answer"));
    assert_eq!(completion.metadata.id.as_deref(), Some("chatcmpl-42"));
    assert_eq!(completion.metadata.usage.total_tokens, 30);
    assert_eq!(completion.metadata.usage.reasoning_tokens, 4);
}

#[tokio::test]
async fn test_rate_limit_reads_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "1.5")
                .set_body_string("slow down"),
        )
        .mount(&server)
        .await;

    let backend = OpenAiCompatBackend::new(server.uri(), "k");
    let err = backend
        .complete(request(), CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BackendError::RateLimited {
            retry_after_ms: Some(1500)
        }
    );
}

#[tokio::test]
async fn test_context_overflow_is_invalid_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_string(r#"{"error": {"code": "context_length_exceeded"}}"#),
        )
        .mount(&server)
        .await;

    let backend = OpenAiCompatBackend::new(format!("{}/", server.uri()), "k");
    let err = backend
        .complete(request(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::InvalidRequest(body) if body.contains("context_length_exceeded")));
}

#[tokio::test]
async fn test_missing_content_is_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let backend = OpenAiCompatBackend::new(server.uri(), "k");
    let err = backend
        .complete(request(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Api(_)));
}

#[tokio::test]
async fn test_cancelled_before_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(std::time::Duration::from_secs(30))
                .set_body_json(json!({"choices": []})),
        )
        .mount(&server)
        .await;

    let backend = OpenAiCompatBackend::new(server.uri(), "k");
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = backend.complete(request(), cancel).await.unwrap_err();
    assert_eq!(err, BackendError::Cancelled);
}
