pub mod action;
pub mod agent;
pub mod context;
pub mod context_manager;
pub mod conversation;
pub mod harness;
pub mod observation;
pub mod prompt;
pub mod provider;
pub mod registry;
pub mod retry;
pub mod session;
pub mod tools;
pub mod types;

pub use agent::{Agent, AgentRole, Outcome, RunScope};
pub use context::ExecutionLimits;
pub use context_manager::{ContextManager, HeuristicContextManager, LlmContextManager};
pub use harness::{EvalItem, EvaluationHarness};
pub use registry::{AgentRegistry, ManagedAgent};
pub use retry::RetryConfig;
pub use session::{Session, TraceStream};
pub use types::*;
