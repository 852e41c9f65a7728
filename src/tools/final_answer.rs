//! Final answer tool, declared so prompts list it; terminal markers resolve
//! before tools, so the engine never actually executes it.

use crate::types::*;
use async_trait::async_trait;
use serde_json::{Map, Value};

pub struct FinalAnswerTool;

#[async_trait]
impl AgentTool for FinalAnswerTool {
    fn name(&self) -> &str {
        FINAL_ANSWER
    }

    fn description(&self) -> &str {
        "Submit the final answer to the task. Ends the run."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "answer": {
                    "type": "string",
                    "description": "Exact result or feedback to return"
                },
                "citations": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Source URLs backing the answer (optional)"
                }
            },
            "required": ["answer"]
        })
    }

    fn output_type(&self) -> &str {
        "any"
    }

    async fn execute(
        &self,
        arguments: Map<String, Value>,
        _cancel: tokio_util::sync::CancellationToken,
    ) -> Result<String, ToolError> {
        match arguments.get("answer") {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Ok(other.to_string()),
            None => Err(ToolError::InvalidArgs("missing 'answer'".into())),
        }
    }
}
