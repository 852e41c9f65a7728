//! Plan tool: a numbered checklist the agent keeps while working.
//!
//! The board is shared (`PlanBoard` is cheap to clone), so a caller can
//! inspect the plan while or after the agent runs.

use crate::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanStep {
    pub index: u64,
    pub plan: String,
    pub done: bool,
}

/// Shared plan state.
#[derive(Debug, Clone, Default)]
pub struct PlanBoard {
    steps: Arc<Mutex<BTreeMap<u64, PlanStep>>>,
}

impl PlanBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> Vec<PlanStep> {
        self.steps
            .lock()
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default()
    }
}

pub struct PlanTool {
    board: PlanBoard,
}

impl PlanTool {
    pub fn new(board: PlanBoard) -> Self {
        Self { board }
    }

    pub fn board(&self) -> &PlanBoard {
        &self.board
    }
}

fn index_arg(arguments: &Map<String, Value>) -> Result<u64, ToolError> {
    arguments
        .get("index")
        .and_then(Value::as_u64)
        .ok_or_else(|| ToolError::InvalidArgs("'index' must be a non-negative integer".into()))
}

fn render_step(step: &PlanStep) -> String {
    let mark = if step.done { "x" } else { " " };
    format!("[{}] {}. {}", mark, step.index, step.plan)
}

#[async_trait]
impl AgentTool for PlanTool {
    fn name(&self) -> &str {
        "plan"
    }

    fn description(&self) -> &str {
        "Maintain a numbered plan. Operations: create (index, plan), update (index, plan and/or done), mark (index), delete (index), list."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["create", "update", "mark", "delete", "list"]
                },
                "index": {"type": "integer", "description": "Step number"},
                "plan": {"type": "string", "description": "Step text"},
                "done": {"type": "boolean", "description": "Completion flag (update only)"}
            },
            "required": ["operation"]
        })
    }

    async fn execute(
        &self,
        arguments: Map<String, Value>,
        _cancel: tokio_util::sync::CancellationToken,
    ) -> Result<String, ToolError> {
        let operation = arguments
            .get("operation")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs("missing 'operation'".into()))?;

        let mut steps = self
            .board
            .steps
            .lock()
            .map_err(|_| ToolError::Failed("plan board is poisoned".into()))?;

        match operation {
            "create" => {
                let index = index_arg(&arguments)?;
                let plan = arguments
                    .get("plan")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ToolError::InvalidArgs("missing 'plan'".into()))?;
                let step = PlanStep {
                    index,
                    plan: plan.to_string(),
                    done: false,
                };
                let line = render_step(&step);
                steps.insert(index, step);
                Ok(format!("Created plan step: {}", line))
            }
            "update" => {
                let index = index_arg(&arguments)?;
                let step = steps
                    .get_mut(&index)
                    .ok_or_else(|| ToolError::InvalidArgs(format!("no plan step {}", index)))?;
                if let Some(plan) = arguments.get("plan").and_then(Value::as_str) {
                    step.plan = plan.to_string();
                }
                if let Some(done) = arguments.get("done").and_then(Value::as_bool) {
                    step.done = done;
                }
                Ok(format!("Updated plan step: {}", render_step(step)))
            }
            "mark" => {
                let index = index_arg(&arguments)?;
                let step = steps
                    .get_mut(&index)
                    .ok_or_else(|| ToolError::InvalidArgs(format!("no plan step {}", index)))?;
                step.done = true;
                Ok(format!("Marked plan step: {}", render_step(step)))
            }
            "delete" => {
                let index = index_arg(&arguments)?;
                let step = steps
                    .remove(&index)
                    .ok_or_else(|| ToolError::InvalidArgs(format!("no plan step {}", index)))?;
                Ok(format!("Deleted plan step: {}", render_step(&step)))
            }
            "list" => {
                if steps.is_empty() {
                    return Ok("Plan is empty".into());
                }
                Ok(steps.values().map(render_step).collect::<Vec<_>>().join("\n"))
            }
            other => Err(ToolError::InvalidArgs(format!(
                "unknown operation '{}'",
                other
            ))),
        }
    }
}
