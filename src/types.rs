use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Reserved action names that end an agent invocation.
pub const FINAL_ANSWER: &str = "final_answer";
pub const FINAL_ANSWER_TOOL: &str = "final_answer_tool";

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// One decision of the reasoning backend: call `name` with `arguments`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl Action {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// A terminal action answering with `answer`.
    pub fn final_answer(answer: impl Into<String>) -> Self {
        let mut arguments = Map::new();
        arguments.insert("answer".into(), Value::String(answer.into()));
        Self::new(FINAL_ANSWER, arguments)
    }

    pub fn is_terminal(&self) -> bool {
        self.name == FINAL_ANSWER || self.name == FINAL_ANSWER_TOOL
    }
}

// ---------------------------------------------------------------------------
// Observations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ObservationKind {
    Tool,
    Agent,
}

impl fmt::Display for ObservationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tool => write!(f, "tool"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

/// The recorded outcome of one non-terminal action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub iteration: usize,
    pub source: String,
    #[serde(rename = "type")]
    pub kind: ObservationKind,
    pub result: String,
    /// Arguments the action was called with, shown to the backend next to the result.
    #[serde(default)]
    pub arguments: Map<String, Value>,
    #[serde(default)]
    pub is_error: bool,
}

// ---------------------------------------------------------------------------
// Conversation messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Completion metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub reasoning_tokens: u64,
}

/// Observability envelope returned alongside every backend reply.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CompletionMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub model: String,
    pub usage: Usage,
    pub latency_ms: u64,
}

// ---------------------------------------------------------------------------
// Trace events
// ---------------------------------------------------------------------------

/// Error categories surfaced in ERROR events and terminal error payloads.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DecodeError,
    InvalidRequest,
    RateLimited,
    Backend,
    Resolution,
    ToolExecution,
    AgentExecution,
    DelegationDepth,
    RejectionLimit,
    LimitExceeded,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DecodeError => "decode_error",
            Self::InvalidRequest => "invalid_request",
            Self::RateLimited => "rate_limited",
            Self::Backend => "backend",
            Self::Resolution => "resolution",
            Self::ToolExecution => "tool_execution",
            Self::AgentExecution => "agent_execution",
            Self::DelegationDepth => "delegation_depth",
            Self::RejectionLimit => "rejection_limit",
            Self::LimitExceeded => "limit_exceeded",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Payload of a trace event; serialized as `{"type": ..., "content": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "content", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TracePayload {
    Assistant {
        metadata: CompletionMetadata,
        action: Action,
    },
    Trace {
        source: String,
        kind: ObservationKind,
        iteration: usize,
        output: String,
    },
    Error {
        kind: ErrorKind,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    FinalAnswer(Value),
}

/// One unit of the streamed output, attributed to the agent that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceEvent {
    pub agent: String,
    pub depth: usize,
    #[serde(flatten)]
    pub payload: TracePayload,
}

impl TraceEvent {
    pub fn type_name(&self) -> &'static str {
        match self.payload {
            TracePayload::Assistant { .. } => "ASSISTANT",
            TracePayload::Trace { .. } => "TRACE",
            TracePayload::Error { .. } => "ERROR",
            TracePayload::FinalAnswer(_) => "FINAL_ANSWER",
        }
    }

    pub fn is_final_answer(&self) -> bool {
        matches!(self.payload, TracePayload::FinalAnswer(_))
    }
}

// ---------------------------------------------------------------------------
// Tool definition
// ---------------------------------------------------------------------------

/// A tool the agent can call. Implement this trait for your tools.
///
/// Tools return plain text and never emit trace events themselves.
#[async_trait::async_trait]
pub trait AgentTool: Send + Sync {
    /// Unique tool name, matched against `Action::name`
    fn name(&self) -> &str;
    /// Description for the reasoning backend
    fn description(&self) -> &str;
    /// JSON Schema for arguments
    fn parameters_schema(&self) -> Value;
    /// Declared output type, rendered into prompts
    fn output_type(&self) -> &str {
        "string"
    }
    /// Execute the tool
    async fn execute(
        &self,
        arguments: Map<String, Value>,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<String, ToolError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{0}")]
    Failed(String),
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("Cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn error_payload(kind: ErrorKind, message: &str) -> Value {
    serde_json::json!({ "kind": kind, "message": message })
}
