//! Decoding backend replies into actions and resolving action names.

use crate::registry::ManagedAgent;
use crate::types::*;
use std::sync::Arc;

/// Name of the built-in observation pruning action.
pub const DELETE_OBSERVATIONS: &str = "delete_observations";

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("empty reply")]
    Empty,
    #[error("reply does not contain a JSON object")]
    NoObject,
    #[error("reply is not a valid action: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Decode a raw backend reply into exactly one `{name, arguments}` action.
///
/// Accepts a bare JSON object, one wrapped in a Markdown code fence, or one
/// surrounded by prose; anything else is a decode error.
pub fn decode_action(raw: &str) -> Result<Action, DecodeError> {
    let trimmed = strip_code_fence(raw.trim());
    if trimmed.is_empty() {
        return Err(DecodeError::Empty);
    }

    match serde_json::from_str::<Action>(trimmed) {
        Ok(action) => Ok(action),
        Err(first) => {
            let (start, end) = match (trimmed.find('{'), trimmed.rfind('}')) {
                (Some(s), Some(e)) if s < e => (s, e),
                _ if trimmed.starts_with('{') => return Err(DecodeError::Invalid(first)),
                _ => return Err(DecodeError::NoObject),
            };
            if start == 0 && end == trimmed.len() - 1 {
                return Err(DecodeError::Invalid(first));
            }
            Ok(serde_json::from_str::<Action>(&trimmed[start..=end])?)
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json") on the opening fence line.
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Engine-handled actions that are neither tools nor sub-agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    DeleteObservations,
}

/// What an action name refers to.
pub enum Resolution {
    Terminal,
    Tool(Arc<dyn AgentTool>),
    SubAgent(ManagedAgent),
    Builtin(Builtin),
    Unresolved,
}

impl Resolution {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Terminal => "terminal",
            Self::Tool(_) => "tool",
            Self::SubAgent(_) => "agent",
            Self::Builtin(_) => "builtin",
            Self::Unresolved => "unresolved",
        }
    }
}

/// Pure lookup: terminal markers first, then tools by declared name, then the
/// opt-in built-ins, then managed agents by key.
pub fn resolve(
    name: &str,
    tools: &[Arc<dyn AgentTool>],
    managed_agents: &[ManagedAgent],
    builtins_enabled: bool,
) -> Resolution {
    if name == FINAL_ANSWER || name == FINAL_ANSWER_TOOL {
        return Resolution::Terminal;
    }
    if let Some(tool) = tools.iter().find(|t| t.name() == name) {
        return Resolution::Tool(Arc::clone(tool));
    }
    if builtins_enabled && name == DELETE_OBSERVATIONS {
        return Resolution::Builtin(Builtin::DeleteObservations);
    }
    if let Some(agent) = managed_agents.iter().find(|a| a.key == name) {
        return Resolution::SubAgent(agent.clone());
    }
    Resolution::Unresolved
}
