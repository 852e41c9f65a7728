//! Session: the outward API that turns one task into a stream of trace events.
//!
//! The stream is lazy from the caller's side: events arrive as the entry
//! agent produces them, and dropping the stream stops the run at its next
//! suspension point.

use crate::agent::{Outcome, RunScope};
use crate::registry::AgentRegistry;
use crate::types::*;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Event stream returned by [`Session::forward`].
pub type TraceStream = UnboundedReceiverStream<TraceEvent>;

/// Maximum nesting of delegated invocations below the entry agent.
pub const DEFAULT_MAX_DELEGATION_DEPTH: usize = 4;

/// Binds a registry to the agent that receives the caller's tasks.
#[derive(Clone)]
pub struct Session {
    registry: Arc<AgentRegistry>,
    entry: String,
    max_delegation_depth: usize,
}

impl Session {
    pub fn new(registry: Arc<AgentRegistry>, entry: impl Into<String>) -> Self {
        Self {
            registry,
            entry: entry.into(),
            max_delegation_depth: DEFAULT_MAX_DELEGATION_DEPTH,
        }
    }

    pub fn with_max_delegation_depth(mut self, depth: usize) -> Self {
        self.max_delegation_depth = depth;
        self
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Run `task` in the background and stream its events.
    ///
    /// `None` continues the entry agent's current task. The stream ends after
    /// the single FINAL_ANSWER event.
    pub fn forward(&self, task: Option<String>) -> TraceStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = self.clone();
        tokio::spawn(async move {
            session.run(task, tx, CancellationToken::new()).await;
        });
        UnboundedReceiverStream::new(rx)
    }

    /// Run `task` to completion and collect every event.
    pub async fn forward_collect(&self, task: Option<String>) -> Vec<TraceEvent> {
        self.forward(task).collect().await
    }

    /// Run `task` on the current task, sending events to `tx`.
    ///
    /// Stops early when `cancel` fires or `tx`'s receiver is dropped.
    pub async fn run(
        &self,
        task: Option<String>,
        tx: mpsc::UnboundedSender<TraceEvent>,
        cancel: CancellationToken,
    ) -> Outcome {
        let run_id = uuid::Uuid::new_v4();
        let scope = RunScope::new(
            Arc::clone(&self.registry),
            tx,
            cancel,
            self.max_delegation_depth,
        );

        let Some(shared) = self.registry.get(&self.entry) else {
            let message = format!("entry agent '{}' is not registered", self.entry);
            warn!("run {}: {}", run_id, message);
            let outcome = Outcome::Failed {
                kind: ErrorKind::Resolution,
                message: message.clone(),
            };
            scope.emit(
                &self.entry,
                TracePayload::Error {
                    kind: ErrorKind::Resolution,
                    message,
                    detail: None,
                },
            );
            scope.emit(&self.entry, TracePayload::FinalAnswer(outcome.payload()));
            return outcome;
        };

        info!("run {}: '{}' starting", run_id, self.entry);
        let mut agent = shared.lock().await;
        let outcome = agent.forward(task, &scope).await;
        info!(
            "run {}: '{}' finished ({})",
            run_id,
            self.entry,
            match &outcome {
                Outcome::Answer(_) => "answer",
                Outcome::Failed { .. } => "failed",
                Outcome::Aborted => "aborted",
            }
        );
        outcome
    }
}
