//! Prompt templates for the agent's seed messages.
//!
//! Templates use `{{ placeholder }}` markers. Known placeholders are `name`,
//! `task`, `tools`, and `managed_agents`; unknown markers are left verbatim.

use crate::registry::ManagedAgent;
use crate::types::AgentTool;
use std::sync::Arc;

pub const DEFAULT_SYSTEM_TEMPLATE: &str = r#"You are {{ name }}, an expert assistant who solves tasks step by step using tools and managed agents.

At every step reply with exactly one JSON object and nothing else:
{"name": "<tool or agent name>", "arguments": {<arguments>}}

When the task is solved, reply with:
{"name": "final_answer", "arguments": {"answer": "<your answer>"}}

## Tools
{{ tools }}

## Managed agents
Call a managed agent like a tool, passing {"task": "<what it should do>"}.
{{ managed_agents }}

## Rules
1. Always reply with a single valid JSON object.
2. Read the observations so far before choosing the next action.
3. Never repeat an action whose result is already in the observations.
4. If an observation reports an error, change your approach."#;

pub const DEFAULT_USER_TEMPLATE: &str = "Task: {{ task }}";

/// Values substituted into templates.
pub struct PromptVars<'a> {
    pub name: &'a str,
    pub task: &'a str,
    pub tools: &'a [Arc<dyn AgentTool>],
    pub managed_agents: &'a [ManagedAgent],
}

/// Render `template` with `vars`.
pub fn render(template: &str, vars: &PromptVars<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        let key = after[..close].trim();
        match lookup(key, vars) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &after[close + 2..];
    }

    out.push_str(rest);
    out
}

fn lookup(key: &str, vars: &PromptVars<'_>) -> Option<String> {
    match key {
        "name" => Some(vars.name.to_string()),
        "task" => Some(vars.task.to_string()),
        "tools" => Some(describe_tools(vars.tools)),
        "managed_agents" => Some(describe_managed_agents(vars.managed_agents)),
        _ => None,
    }
}

pub fn describe_tools(tools: &[Arc<dyn AgentTool>]) -> String {
    if tools.is_empty() {
        return "(none)".into();
    }
    tools
        .iter()
        .map(|t| {
            format!(
                "- {}: {}\n  arguments: {}\n  returns: {}",
                t.name(),
                t.description(),
                t.parameters_schema(),
                t.output_type()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn describe_managed_agents(agents: &[ManagedAgent]) -> String {
    if agents.is_empty() {
        return "(none)".into();
    }
    agents
        .iter()
        .map(|a| format!("- {}: {}", a.key, a.description))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FinalAnswerTool;

    #[test]
    fn test_render_placeholders() {
        let tools: Vec<Arc<dyn AgentTool>> = vec![Arc::new(FinalAnswerTool)];
        let managed = vec![ManagedAgent::new(
            "deep_researcher",
            "deep_researcher_agent",
            "Researches a topic in depth",
        )];
        let vars = PromptVars {
            name: "planning_agent",
            task: "capital of France?",
            tools: &tools,
            managed_agents: &managed,
        };

        let system = render(DEFAULT_SYSTEM_TEMPLATE, &vars);
        assert!(system.starts_with("You are planning_agent,"));
        assert!(system.contains("- final_answer: "));
        assert!(system.contains("- deep_researcher: Researches a topic in depth"));
        assert!(!system.contains("{{"));

        assert_eq!(
            render(DEFAULT_USER_TEMPLATE, &vars),
            "Task: capital of France?"
        );
    }

    #[test]
    fn test_unknown_and_unclosed_markers_kept() {
        let vars = PromptVars {
            name: "a",
            task: "t",
            tools: &[],
            managed_agents: &[],
        };
        assert_eq!(render("{{name}} {{ other }}", &vars), "a {{ other }}");
        assert_eq!(render("x {{ task", &vars), "x {{ task");
        assert_eq!(render("{{tools}}", &vars), "(none)");
    }
}
