//! The agent execution engine: reason → act → observe → repeat.
//!
//! An `Agent` owns one role's conversation and observation log. Each
//! `forward` call runs the loop until the backend picks a terminal action,
//! streaming `TraceEvent`s through the `RunScope` as it goes. Failures never
//! escape: they become ERROR events, error-tagged observations, or a terminal
//! error payload.

use crate::action::{decode_action, resolve, Builtin, Resolution, DELETE_OBSERVATIONS};
use crate::context::{self, ExecutionLimits, ExecutionTracker};
use crate::context_manager::{ContextManager, HeuristicContextManager};
use crate::conversation::Conversation;
use crate::observation::ObservationLog;
use crate::prompt::{self, PromptVars};
use crate::provider::{CompletionRequest, ReasoningBackend};
use crate::registry::{AgentRegistry, ManagedAgent};
use crate::retry::{log_retry, Recovery, RetryConfig};
use crate::tools::FinalAnswerTool;
use crate::types::*;
use futures::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Planners keep their observations across answers (session memory);
/// workers clear theirs after every terminal answer so each delegated call
/// starts clean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentRole {
    Planner,
    #[default]
    Worker,
}

/// How one `forward` invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The backend's terminal arguments, verbatim.
    Answer(Map<String, Value>),
    /// Retries or limits were exhausted.
    Failed { kind: ErrorKind, message: String },
    /// The caller stopped listening or cancelled.
    Aborted,
}

impl Outcome {
    fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            message: message.into(),
        }
    }

    /// FINAL_ANSWER content for this outcome.
    pub fn payload(&self) -> Value {
        match self {
            Self::Answer(arguments) => Value::Object(arguments.clone()),
            Self::Failed { kind, message } => {
                serde_json::json!({ "error": error_payload(*kind, message) })
            }
            Self::Aborted => {
                serde_json::json!({ "error": error_payload(ErrorKind::Cancelled, "run cancelled") })
            }
        }
    }

    /// Plain-text rendering used when the outcome becomes a parent's observation.
    pub fn answer_text(&self) -> String {
        match self {
            Self::Answer(arguments) => match arguments.get("answer") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => Value::Object(arguments.clone()).to_string(),
            },
            Self::Failed { kind, message } => format!("{}: {}", kind, message),
            Self::Aborted => "aborted".into(),
        }
    }

    pub fn is_answer(&self) -> bool {
        matches!(self, Self::Answer(_))
    }
}

// ---------------------------------------------------------------------------
// Run scope
// ---------------------------------------------------------------------------

/// Per-invocation plumbing threaded through nested `forward` calls.
#[derive(Clone)]
pub struct RunScope {
    registry: Arc<AgentRegistry>,
    tx: mpsc::UnboundedSender<TraceEvent>,
    cancel: CancellationToken,
    depth: usize,
    max_depth: usize,
}

impl RunScope {
    pub fn new(
        registry: Arc<AgentRegistry>,
        tx: mpsc::UnboundedSender<TraceEvent>,
        cancel: CancellationToken,
        max_depth: usize,
    ) -> Self {
        Self {
            registry,
            tx,
            cancel,
            depth: 0,
            max_depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    fn child(&self) -> Self {
        Self {
            depth: self.depth + 1,
            ..self.clone()
        }
    }

    /// The caller cancelled or dropped the event stream.
    fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    pub(crate) fn emit(&self, agent: &str, payload: TracePayload) {
        self.tx
            .send(TraceEvent {
                agent: agent.to_string(),
                depth: self.depth,
                payload,
            })
            .ok();
    }

    fn emit_error(&self, agent: &str, kind: ErrorKind, message: &str, detail: Option<String>) {
        self.emit(
            agent,
            TracePayload::Error {
                kind,
                message: message.to_string(),
                detail,
            },
        );
    }
}

/// Result of one reasoning step.
enum Decision {
    Act(Action),
    Fail(ErrorKind, String),
    Aborted,
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// One agent role: identity, backend binding, tools, managed agents, and the
/// conversation/observation state that lives as long as the instance.
pub struct Agent {
    name: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Ask the backend for JSON-constrained replies.
    pub json_mode: bool,
    backend: Arc<dyn ReasoningBackend>,
    role: AgentRole,
    tools: Vec<Arc<dyn AgentTool>>,
    managed_agents: Vec<ManagedAgent>,
    context_manager: Arc<dyn ContextManager>,
    pub retry_config: RetryConfig,
    pub execution_limits: ExecutionLimits,
    system_template: String,
    user_template: String,
    observation_pruning: bool,

    // State
    conversation: Conversation,
    observations: ObservationLog,
    task: Option<String>,
}

impl Agent {
    pub fn new(name: impl Into<String>, backend: Arc<dyn ReasoningBackend>) -> Self {
        Self {
            name: name.into(),
            model: String::new(),
            temperature: None,
            max_tokens: None,
            json_mode: false,
            backend,
            role: AgentRole::default(),
            tools: vec![Arc::new(FinalAnswerTool)],
            managed_agents: Vec::new(),
            context_manager: Arc::new(HeuristicContextManager::default()),
            retry_config: RetryConfig::default(),
            execution_limits: ExecutionLimits::default(),
            system_template: prompt::DEFAULT_SYSTEM_TEMPLATE.to_string(),
            user_template: prompt::DEFAULT_USER_TEMPLATE.to_string(),
            observation_pruning: false,
            conversation: Conversation::new(),
            observations: ObservationLog::new(),
            task: None,
        }
    }

    // -- Builder-style setters --

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_role(mut self, role: AgentRole) -> Self {
        self.role = role;
        self
    }

    /// Add tools to the tool set (the final-answer declaration is always present).
    pub fn with_tools(mut self, tools: Vec<Arc<dyn AgentTool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn with_managed_agent(mut self, agent: ManagedAgent) -> Self {
        self.managed_agents.push(agent);
        self
    }

    pub fn with_context_manager(mut self, manager: Arc<dyn ContextManager>) -> Self {
        self.context_manager = manager;
        self
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    pub fn with_execution_limits(mut self, limits: ExecutionLimits) -> Self {
        self.execution_limits = limits;
        self
    }

    pub fn with_system_template(mut self, template: impl Into<String>) -> Self {
        self.system_template = template.into();
        self
    }

    pub fn with_user_template(mut self, template: impl Into<String>) -> Self {
        self.user_template = template.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }

    /// Let the backend prune its own observations with `delete_observations`.
    pub fn with_observation_pruning(mut self, enabled: bool) -> Self {
        self.observation_pruning = enabled;
        self
    }

    // -- State access --

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn tools(&self) -> &[Arc<dyn AgentTool>] {
        &self.tools
    }

    pub fn managed_agents(&self) -> &[ManagedAgent] {
        &self.managed_agents
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn observations(&self) -> &[Observation] {
        self.observations.entries()
    }

    /// Iteration the next observation will be recorded at.
    pub fn execution_iteration(&self) -> usize {
        self.observations.iteration()
    }

    /// Register a tool at runtime. Needs `&mut self`, so it can never race
    /// with a running `forward`.
    pub fn add_tool(&mut self, tool: Arc<dyn AgentTool>) {
        self.tools.push(tool);
    }

    pub fn add_managed_agent(&mut self, agent: ManagedAgent) {
        self.managed_agents.push(agent);
    }

    // -- Execution --

    /// Run until a terminal action. Boxed so delegation can recurse.
    pub fn forward<'a>(
        &'a mut self,
        task: Option<String>,
        scope: &'a RunScope,
    ) -> BoxFuture<'a, Outcome> {
        async move { self.run(task, scope).await }.boxed()
    }

    async fn run(&mut self, task: Option<String>, scope: &RunScope) -> Outcome {
        self.prepare(task);
        let mut tracker = ExecutionTracker::new(self.execution_limits.clone());
        let mut rejections: usize = 0;

        loop {
            if scope.is_stopped() {
                debug!("[{}] caller stopped listening, aborting", self.name);
                return self.abort(scope);
            }
            if let Some(reason) = tracker.check_limits() {
                warn!("[{}] execution limit reached: {}", self.name, reason);
                scope.emit_error(&self.name, ErrorKind::LimitExceeded, &reason, None);
                return self.finish(scope, Outcome::failed(ErrorKind::LimitExceeded, reason));
            }
            tracker.record_turn();

            let action = match self.next_action(scope).await {
                Decision::Act(action) => action,
                Decision::Fail(kind, message) => {
                    return self.finish(scope, Outcome::failed(kind, message));
                }
                Decision::Aborted => return self.abort(scope),
            };

            let resolution = resolve(
                &action.name,
                &self.tools,
                &self.managed_agents,
                self.observation_pruning,
            );
            debug!(
                "[{}] iteration {}: {} resolved as {}",
                self.name,
                self.observations.iteration(),
                action.name,
                resolution.label()
            );

            match resolution {
                Resolution::Terminal => {
                    return self.finish(scope, Outcome::Answer(action.arguments));
                }
                Resolution::Tool(tool) => {
                    let result = tool
                        .execute(action.arguments.clone(), scope.cancel.child_token())
                        .await;
                    match result {
                        Ok(output) => {
                            let task = self.task.clone().unwrap_or_default();
                            if !self.context_manager.verify(&task, &output).await {
                                rejections += 1;
                                info!(
                                    "[{}] output of '{}' rejected as irrelevant ({}/{})",
                                    self.name, action.name, rejections, self.retry_config.max_rejections
                                );
                                if rejections >= self.retry_config.max_rejections {
                                    let message = format!(
                                        "{} consecutive tool outputs rejected as irrelevant",
                                        rejections
                                    );
                                    scope.emit_error(
                                        &self.name,
                                        ErrorKind::RejectionLimit,
                                        &message,
                                        None,
                                    );
                                    return self.finish(
                                        scope,
                                        Outcome::failed(ErrorKind::RejectionLimit, message),
                                    );
                                }
                                continue;
                            }
                            rejections = 0;
                            self.observe(
                                scope,
                                action.name,
                                ObservationKind::Tool,
                                action.arguments,
                                output,
                                false,
                            );
                        }
                        Err(ToolError::Cancelled) if scope.is_stopped() => {
                            return self.abort(scope);
                        }
                        Err(e) => {
                            let message = e.to_string();
                            warn!("[{}] tool '{}' failed: {}", self.name, action.name, message);
                            scope.emit_error(
                                &self.name,
                                ErrorKind::ToolExecution,
                                &message,
                                Some(action.name.clone()),
                            );
                            self.observe(
                                scope,
                                action.name,
                                ObservationKind::Tool,
                                action.arguments,
                                format!("ERROR: {}", message),
                                true,
                            );
                        }
                    }
                }
                Resolution::SubAgent(managed) => {
                    match self.delegate(&managed, &action.arguments, scope).await {
                        Outcome::Answer(arguments) => {
                            let text = Outcome::Answer(arguments).answer_text();
                            self.observe(
                                scope,
                                managed.key,
                                ObservationKind::Agent,
                                action.arguments,
                                text,
                                false,
                            );
                        }
                        Outcome::Failed { kind, message } => {
                            warn!(
                                "[{}] delegation to '{}' failed: {}",
                                self.name, managed.key, message
                            );
                            scope.emit_error(&self.name, kind, &message, Some(managed.key.clone()));
                            self.observe(
                                scope,
                                managed.key,
                                ObservationKind::Agent,
                                action.arguments,
                                format!("ERROR: {}: {}", kind, message),
                                true,
                            );
                        }
                        Outcome::Aborted => return self.abort(scope),
                    }
                }
                Resolution::Builtin(Builtin::DeleteObservations) => {
                    let (result, is_error) =
                        match action.arguments.get("iteration").and_then(Value::as_u64) {
                            Some(iteration) => {
                                let removed = self.observations.delete_iteration(iteration as usize);
                                (
                                    format!(
                                        "Deleted {} observation(s) from iteration {}",
                                        removed, iteration
                                    ),
                                    false,
                                )
                            }
                            None => (
                                "ERROR: 'iteration' must be a non-negative integer".to_string(),
                                true,
                            ),
                        };
                    self.observe(
                        scope,
                        DELETE_OBSERVATIONS.to_string(),
                        ObservationKind::Tool,
                        action.arguments,
                        result,
                        is_error,
                    );
                }
                Resolution::Unresolved => {
                    let message = format!("tool or agent '{}' not found", action.name);
                    warn!("[{}] {}", self.name, message);
                    let available = self
                        .tools
                        .iter()
                        .map(|t| t.name().to_string())
                        .chain(self.managed_agents.iter().map(|a| a.key.clone()))
                        .collect::<Vec<_>>()
                        .join(", ");
                    scope.emit_error(
                        &self.name,
                        ErrorKind::Resolution,
                        &message,
                        Some(format!("available: {}", available)),
                    );
                    self.observe(
                        scope,
                        action.name,
                        ObservationKind::Tool,
                        action.arguments,
                        format!("ERROR: {}. Available: {}", message, available),
                        true,
                    );
                }
            }
        }
    }

    /// Seed the conversation on first use; later tasks are appended.
    fn prepare(&mut self, task: Option<String>) {
        if !self.conversation.is_seeded() {
            let task_text = task.clone().unwrap_or_default();
            let vars = PromptVars {
                name: &self.name,
                task: &task_text,
                tools: &self.tools,
                managed_agents: &self.managed_agents,
            };
            let system = prompt::render(&self.system_template, &vars);
            let user = prompt::render(&self.user_template, &vars);
            self.conversation.seed(system, user);
            self.task = task;
            return;
        }

        if let Some(task) = task {
            if self.task.as_deref() != Some(task.as_str()) {
                self.conversation.push_user(format!("New task: {}", task));
                self.task = Some(task);
            }
        }
    }

    fn build_request(&self) -> CompletionRequest {
        let mut messages = self.conversation.messages();
        if let Some(observations) = self.observations.render() {
            messages.push(observations);
        }
        CompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            json_mode: self.json_mode,
        }
    }

    /// Ask the backend for the next action, applying the retry policies.
    async fn next_action(&mut self, scope: &RunScope) -> Decision {
        let max_retries = self.retry_config.max_retries;
        let mut decode_failures: usize = 0;
        let mut rate_limits: usize = 0;
        let mut minimizations: usize = 0;

        loop {
            if scope.is_stopped() {
                return Decision::Aborted;
            }

            let request = self.build_request();
            debug!(
                "[{}] backend request: {} messages, ~{} tokens",
                self.name,
                request.messages.len(),
                context::total_tokens(&request.messages)
            );

            let error = match self
                .backend
                .complete(request, scope.cancel.child_token())
                .await
            {
                Ok(completion) => match decode_action(&completion.text) {
                    Ok(action) => {
                        scope.emit(
                            &self.name,
                            TracePayload::Assistant {
                                metadata: completion.metadata,
                                action: action.clone(),
                            },
                        );
                        return Decision::Act(action);
                    }
                    Err(e) => {
                        decode_failures += 1;
                        let message = e.to_string();
                        warn!(
                            "[{}] undecodable reply ({}/{}): {}",
                            self.name, decode_failures, max_retries, message
                        );
                        scope.emit_error(
                            &self.name,
                            ErrorKind::DecodeError,
                            &message,
                            Some(completion.text),
                        );
                        if decode_failures >= max_retries {
                            return Decision::Fail(
                                ErrorKind::DecodeError,
                                format!(
                                    "reply could not be decoded after {} attempts: {}",
                                    decode_failures, message
                                ),
                            );
                        }
                        self.recover_from_decode_failure(decode_failures).await;
                        continue;
                    }
                },
                Err(e) => e,
            };

            if scope.is_stopped() {
                return Decision::Aborted;
            }

            match error.recovery() {
                Recovery::Backoff => {
                    rate_limits += 1;
                    let message = error.to_string();
                    scope.emit_error(&self.name, error.kind(), &message, None);
                    if rate_limits >= max_retries {
                        return Decision::Fail(
                            error.kind(),
                            format!("gave up after {} attempts: {}", rate_limits, message),
                        );
                    }
                    if let Some(hint) = error.retry_after() {
                        debug!("[{}] backend suggested retry after {:?}", self.name, hint);
                    }
                    let delay = self.retry_config.rate_limit_backoff;
                    log_retry(&self.name, rate_limits, max_retries, &delay, &message);
                    tokio::select! {
                        _ = scope.cancel.cancelled() => return Decision::Aborted,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Recovery::Minimize => {
                    minimizations += 1;
                    let message = error.to_string();
                    scope.emit_error(&self.name, error.kind(), &message, None);
                    if self.observations.is_empty()
                        || minimizations > self.retry_config.max_context_retries
                    {
                        return Decision::Fail(error.kind(), message);
                    }
                    self.minimize_observations().await;
                }
                Recovery::Fatal => {
                    warn!("[{}] backend error: {}", self.name, error);
                    let message = error.to_string();
                    scope.emit_error(&self.name, error.kind(), &message, None);
                    return Decision::Fail(error.kind(), message);
                }
            }
        }
    }

    /// First failure: compact the newest observation in place. Later
    /// failures: drop it.
    async fn recover_from_decode_failure(&mut self, attempt: usize) {
        if attempt == 1 {
            let Some(last) = self.observations.last().cloned() else {
                return;
            };
            let task = self.task.clone().unwrap_or_default();
            let summary = self
                .context_manager
                .summarize(&task, &last.result, &last.source)
                .await;
            debug!(
                "[{}] summarized observation {} ({} -> {} chars)",
                self.name,
                last.iteration,
                last.result.len(),
                summary.len()
            );
            self.observations.replace_last_result(summary);
        } else if let Some(dropped) = self.observations.drop_last() {
            debug!(
                "[{}] dropped observation {} from '{}'",
                self.name, dropped.iteration, dropped.source
            );
        }
    }

    async fn minimize_observations(&mut self) {
        let task = self.task.clone().unwrap_or_default();
        let before = self.observations.len();
        let keep = self
            .context_manager
            .minimize(&task, self.observations.entries())
            .await;
        self.observations.retain_positions(&keep);
        info!(
            "[{}] context minimized: kept {}/{} observations",
            self.name,
            self.observations.len(),
            before
        );
    }

    /// Run a managed agent's `forward` as a nested invocation.
    async fn delegate(
        &self,
        managed: &ManagedAgent,
        arguments: &Map<String, Value>,
        scope: &RunScope,
    ) -> Outcome {
        if scope.depth + 1 > scope.max_depth {
            return Outcome::failed(
                ErrorKind::DelegationDepth,
                format!(
                    "delegating to '{}' would exceed the maximum depth of {}",
                    managed.key, scope.max_depth
                ),
            );
        }
        let Some(shared) = scope.registry.get(&managed.target) else {
            return Outcome::failed(
                ErrorKind::Resolution,
                format!("agent '{}' is not registered", managed.target),
            );
        };
        // Held by an ancestor in this delegation chain (or by another run).
        let Ok(mut sub_agent) = shared.try_lock() else {
            return Outcome::failed(
                ErrorKind::AgentExecution,
                format!("agent '{}' is already running", managed.target),
            );
        };

        let task = task_argument(arguments);
        info!(
            "[{}] delegating to '{}' (depth {}): {}",
            self.name,
            managed.target,
            scope.depth + 1,
            task
        );
        sub_agent.forward(Some(task), &scope.child()).await
    }

    fn observe(
        &mut self,
        scope: &RunScope,
        source: String,
        kind: ObservationKind,
        arguments: Map<String, Value>,
        result: String,
        is_error: bool,
    ) {
        let iteration = self.observations.iteration();
        if !is_error {
            scope.emit(
                &self.name,
                TracePayload::Trace {
                    source: source.clone(),
                    kind,
                    iteration,
                    output: result.clone(),
                },
            );
        }
        self.observations
            .record(source, kind, arguments, result, is_error);
    }

    fn finish(&mut self, scope: &RunScope, outcome: Outcome) -> Outcome {
        self.release_observations();
        if scope.depth == 0 {
            scope.emit(&self.name, TracePayload::FinalAnswer(outcome.payload()));
        }
        info!(
            "[{}] finished at depth {}: {}",
            self.name,
            scope.depth,
            if outcome.is_answer() { "answer" } else { "error" }
        );
        outcome
    }

    /// Stop the run without an answer. The entry agent still closes the
    /// stream with a cancelled FINAL_ANSWER if anyone is listening.
    fn abort(&mut self, scope: &RunScope) -> Outcome {
        self.release_observations();
        if scope.depth == 0 && !scope.tx.is_closed() {
            scope.emit(&self.name, TracePayload::FinalAnswer(Outcome::Aborted.payload()));
        }
        info!("[{}] aborted at depth {}", self.name, scope.depth);
        Outcome::Aborted
    }

    fn release_observations(&mut self) {
        if self.role == AgentRole::Worker {
            self.observations.clear();
        }
    }
}

/// The delegated task: the `task` argument, or the whole argument object.
fn task_argument(arguments: &Map<String, Value>) -> String {
    match arguments.get("task") {
        Some(Value::String(task)) => task.clone(),
        _ => Value::Object(arguments.clone()).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_payloads() {
        let mut args = Map::new();
        args.insert("answer".into(), Value::String("Paris".into()));
        let answer = Outcome::Answer(args);
        assert_eq!(answer.payload(), serde_json::json!({"answer": "Paris"}));
        assert_eq!(answer.answer_text(), "Paris");

        let failed = Outcome::failed(ErrorKind::DecodeError, "bad json");
        assert_eq!(
            failed.payload(),
            serde_json::json!({"error": {"kind": "decode_error", "message": "bad json"}})
        );
        assert_eq!(failed.answer_text(), "decode_error: bad json");

        assert_eq!(
            Outcome::Aborted.payload(),
            serde_json::json!({"error": {"kind": "cancelled", "message": "run cancelled"}})
        );
    }

    #[test]
    fn test_task_argument() {
        let mut args = Map::new();
        args.insert("task".into(), Value::String("find x".into()));
        assert_eq!(task_argument(&args), "find x");

        let mut args = Map::new();
        args.insert("query".into(), Value::String("q".into()));
        assert_eq!(task_argument(&args), r#"{"query":"q"}"#);
    }
}
