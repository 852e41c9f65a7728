//! Agent registry: the name -> agent indirection used for delegation.
//!
//! Agents never own each other. A parent only knows a `ManagedAgent` entry
//! (action key + registry name); the engine looks the target up here at call
//! time, so cyclic delegation graphs (planner -> browser -> researcher ->
//! browser) carry no ownership cycles.

use crate::agent::Agent;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A delegation target as seen by its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedAgent {
    /// Action name the reasoning backend uses to call this agent.
    pub key: String,
    /// Registry name of the agent that runs the delegated task.
    pub target: String,
    pub description: String,
}

impl ManagedAgent {
    pub fn new(
        key: impl Into<String>,
        target: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            target: target.into(),
            description: description.into(),
        }
    }

    /// Arguments schema every managed agent accepts.
    pub fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "The task to delegate to this agent"
                }
            },
            "required": ["task"]
        })
    }
}

pub type SharedAgent = Arc<Mutex<Agent>>;

/// Read-only after construction. Build one per task session.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<String, SharedAgent>,
}

impl AgentRegistry {
    pub fn builder() -> AgentRegistryBuilder {
        AgentRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<SharedAgent> {
        self.agents.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.agents.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[derive(Default)]
pub struct AgentRegistryBuilder {
    agents: HashMap<String, SharedAgent>,
}

impl AgentRegistryBuilder {
    /// Register an agent under its own name. A later agent with the same
    /// name replaces the earlier one.
    pub fn agent(mut self, agent: Agent) -> Self {
        let name = agent.name().to_string();
        self.agents.insert(name, Arc::new(Mutex::new(agent)));
        self
    }

    pub fn build(self) -> Arc<AgentRegistry> {
        Arc::new(AgentRegistry {
            agents: self.agents,
        })
    }
}
