//! Wire-shape tests for trace events and core types.

use hieragent::*;
use serde_json::json;

fn roundtrip<T: serde::Serialize + serde::de::DeserializeOwned + PartialEq + std::fmt::Debug>(
    value: &T,
) {
    let json = serde_json::to_string(value).expect("serialize");
    let back: T = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(*value, back);
}

// ---------------------------------------------------------------------------
// Trace events
// ---------------------------------------------------------------------------

#[test]
fn test_assistant_event_shape() {
    let event = TraceEvent {
        agent: "planning_agent".into(),
        depth: 0,
        payload: TracePayload::Assistant {
            metadata: CompletionMetadata {
                id: Some("chatcmpl-1".into()),
                model: "llama".into(),
                usage: Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                    reasoning_tokens: 0,
                },
                latency_ms: 120,
            },
            action: Action::final_answer("Paris"),
        },
    };

    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["agent"], "planning_agent");
    assert_eq!(value["depth"], 0);
    assert_eq!(value["type"], "ASSISTANT");
    assert_eq!(
        value["content"]["action"],
        json!({"name": "final_answer", "arguments": {"answer": "Paris"}})
    );
    assert_eq!(value["content"]["metadata"]["usage"]["total_tokens"], 15);
    roundtrip(&event);
}

#[test]
fn test_trace_event_shape() {
    let event = TraceEvent {
        agent: "browser_use_agent".into(),
        depth: 1,
        payload: TracePayload::Trace {
            source: "web_search".into(),
            kind: ObservationKind::Tool,
            iteration: 3,
            output: "results".into(),
        },
    };

    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "TRACE");
    assert_eq!(
        value["content"],
        json!({"source": "web_search", "kind": "tool", "iteration": 3, "output": "results"})
    );
    roundtrip(&event);
}

#[test]
fn test_error_event_omits_missing_detail() {
    let event = TraceEvent {
        agent: "planning_agent".into(),
        depth: 0,
        payload: TracePayload::Error {
            kind: ErrorKind::RateLimited,
            message: "slow down".into(),
            detail: None,
        },
    };

    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "ERROR");
    assert_eq!(
        value["content"],
        json!({"kind": "rate_limited", "message": "slow down"})
    );
    roundtrip(&event);
}

#[test]
fn test_final_answer_event_shape() {
    let event = TraceEvent {
        agent: "planning_agent".into(),
        depth: 0,
        payload: TracePayload::FinalAnswer(json!({"answer": "Paris"})),
    };

    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(
        value,
        json!({
            "agent": "planning_agent",
            "depth": 0,
            "type": "FINAL_ANSWER",
            "content": {"answer": "Paris"}
        })
    );
    assert!(event.is_final_answer());
    roundtrip(&event);
}

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

#[test]
fn test_observation_type_field() {
    let obs = Observation {
        iteration: 0,
        source: "browser_user".into(),
        kind: ObservationKind::Agent,
        result: "found".into(),
        arguments: serde_json::Map::new(),
        is_error: false,
    };
    let value = serde_json::to_value(&obs).unwrap();
    assert_eq!(value["type"], "agent");
    roundtrip(&obs);
}

#[test]
fn test_error_kind_display_matches_serde() {
    for kind in [
        ErrorKind::DecodeError,
        ErrorKind::InvalidRequest,
        ErrorKind::DelegationDepth,
        ErrorKind::RejectionLimit,
        ErrorKind::LimitExceeded,
        ErrorKind::Cancelled,
    ] {
        assert_eq!(
            serde_json::to_value(kind).unwrap(),
            json!(kind.to_string())
        );
    }
}

#[test]
fn test_chat_message_roles() {
    let value = serde_json::to_value(ChatMessage::assistant("hi")).unwrap();
    assert_eq!(value, json!({"role": "assistant", "content": "hi"}));
}
