//! Tests for the built-in tools.

use hieragent::tools::{FinalAnswerTool, PlanBoard, PlanTool};
use hieragent::*;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

fn args(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

async fn plan(tool: &PlanTool, value: Value) -> Result<String, ToolError> {
    tool.execute(args(value), CancellationToken::new()).await
}

// ---------------------------------------------------------------------------
// Plan tool
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_plan_create_mark_list() {
    let board = PlanBoard::new();
    let tool = PlanTool::new(board.clone());

    let created = plan(&tool, json!({"operation": "create", "index": 1, "plan": "Search"}))
        .await
        .unwrap();
    assert_eq!(created, "Created plan step: [ ] 1. Search");
    plan(&tool, json!({"operation": "create", "index": 2, "plan": "Summarize"}))
        .await
        .unwrap();

    let marked = plan(&tool, json!({"operation": "mark", "index": 1}))
        .await
        .unwrap();
    assert_eq!(marked, "Marked plan step: [x] 1. Search");

    let listed = plan(&tool, json!({"operation": "list"})).await.unwrap();
    assert_eq!(listed, "[x] 1. Search\n[ ] 2. Summarize");

    // The board is shared with the caller.
    let steps = board.steps();
    assert_eq!(steps.len(), 2);
    assert!(steps[0].done);
    assert!(!steps[1].done);
}

#[tokio::test]
async fn test_plan_update_and_delete() {
    let tool = PlanTool::new(PlanBoard::new());
    plan(&tool, json!({"operation": "create", "index": 3, "plan": "Draft"}))
        .await
        .unwrap();

    let updated = plan(
        &tool,
        json!({"operation": "update", "index": 3, "plan": "Final draft", "done": true}),
    )
    .await
    .unwrap();
    assert_eq!(updated, "Updated plan step: [x] 3. Final draft");

    plan(&tool, json!({"operation": "delete", "index": 3}))
        .await
        .unwrap();
    assert_eq!(
        plan(&tool, json!({"operation": "list"})).await.unwrap(),
        "Plan is empty"
    );
    assert!(tool.board().steps().is_empty());
}

#[tokio::test]
async fn test_plan_invalid_arguments() {
    let tool = PlanTool::new(PlanBoard::new());

    assert!(matches!(
        plan(&tool, json!({})).await,
        Err(ToolError::InvalidArgs(_))
    ));
    assert!(matches!(
        plan(&tool, json!({"operation": "fly"})).await,
        Err(ToolError::InvalidArgs(_))
    ));
    assert!(matches!(
        plan(&tool, json!({"operation": "mark", "index": 9})).await,
        Err(ToolError::InvalidArgs(_))
    ));
    assert!(matches!(
        plan(&tool, json!({"operation": "create", "index": -1, "plan": "x"})).await,
        Err(ToolError::InvalidArgs(_))
    ));
}

// ---------------------------------------------------------------------------
// Final answer declaration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_final_answer_tool_declaration() {
    let tool = FinalAnswerTool;
    assert_eq!(tool.name(), FINAL_ANSWER);
    assert_eq!(tool.output_type(), "any");
    assert_eq!(tool.parameters_schema()["required"], json!(["answer"]));

    let out = tool
        .execute(args(json!({"answer": "42"})), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(out, "42");
}
