//! Context manager: relevance checks, summaries and pruning of observations.
//!
//! Every operation degrades instead of failing: `verify` fails open,
//! `summarize` returns its input unchanged, and `minimize` never empties a
//! non-empty log.

use crate::context::{keep_within_budget, truncate_text_head_tail};
use crate::provider::{CompletionRequest, ReasoningBackend};
use crate::types::*;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Sentinel returned by `summarize` when nothing in the output is relevant.
pub const NOTHING_RELEVANT: &str = "NONE";

#[async_trait]
pub trait ContextManager: Send + Sync {
    /// Does `output` contain any signal relevant to `task`?
    async fn verify(&self, task: &str, output: &str) -> bool;

    /// Compress `output` (produced by `source`) to the facts relevant to `task`.
    async fn summarize(&self, task: &str, output: &str, source: &str) -> String;

    /// Positions of the observations worth keeping.
    ///
    /// Default: keep every observation `verify` accepts; if that rejects all
    /// of a non-empty log, keep the newest one.
    async fn minimize(&self, task: &str, observations: &[Observation]) -> BTreeSet<usize> {
        let mut keep = BTreeSet::new();
        for (position, obs) in observations.iter().enumerate() {
            if self.verify(task, &obs.result).await {
                keep.insert(position);
            }
        }
        if keep.is_empty() && !observations.is_empty() {
            keep.insert(observations.len() - 1);
        }
        keep
    }
}

// ---------------------------------------------------------------------------
// Heuristic (no backend)
// ---------------------------------------------------------------------------

/// Backend-free context manager: accepts everything, summarizes by
/// head/tail truncation, minimizes to a token budget.
#[derive(Debug, Clone)]
pub struct HeuristicContextManager {
    /// Lines kept by `summarize`
    pub summary_max_lines: usize,
    /// Token budget `minimize` compacts the log into
    pub observation_budget: usize,
}

impl Default for HeuristicContextManager {
    fn default() -> Self {
        Self {
            summary_max_lines: 40,
            observation_budget: 24_000,
        }
    }
}

#[async_trait]
impl ContextManager for HeuristicContextManager {
    async fn verify(&self, _task: &str, _output: &str) -> bool {
        true
    }

    async fn summarize(&self, _task: &str, output: &str, _source: &str) -> String {
        truncate_text_head_tail(output, self.summary_max_lines)
    }

    async fn minimize(&self, _task: &str, observations: &[Observation]) -> BTreeSet<usize> {
        keep_within_budget(observations, self.observation_budget)
    }
}

// ---------------------------------------------------------------------------
// Backend-driven
// ---------------------------------------------------------------------------

const VERIFY_SYSTEM_PROMPT: &str = r#"You are a relevance filter for an autonomous agent.

Decide whether a tool output contains ANY information that could help solve the task:
facts, results, constraints, errors, or leads worth following.

Answer with exactly one word: YES or NO."#;

const SUMMARIZE_SYSTEM_PROMPT: &str = r#"You are a tool-output summarization agent.

Your task:
  - Read the raw output produced by a tool.
  - Extract only task-relevant, decision-useful facts.
  - Discard navigation text, UI elements, boilerplate, repetition, and procedural noise.
  - Preserve facts, results, constraints, errors, and signals that materially affect task completion.

Output rules:
  - Output concise Markdown bullet points only.
  - Do NOT add, infer, or reinterpret information.
  - Keep the summary extremely short (usually 1-2 bullets, never more than 4).
  - If nothing in the output is relevant, reply with exactly: NONE"#;

/// Context manager backed by its own reasoning-backend binding, usually a
/// smaller and faster model than the agent's.
pub struct LlmContextManager {
    backend: Arc<dyn ReasoningBackend>,
    model: String,
    /// Extra attempts `verify` makes before failing open.
    pub verify_retries: usize,
    /// Characters of tool output sent to the backend per call.
    pub max_output_chars: usize,
    cancel: CancellationToken,
}

impl LlmContextManager {
    pub fn new(backend: Arc<dyn ReasoningBackend>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
            verify_retries: 2,
            max_output_chars: 48_000,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_verify_retries(mut self, retries: usize) -> Self {
        self.verify_retries = retries;
        self
    }

    /// Stop issuing backend calls once `cancel` fires; pending calls are
    /// cancelled and every operation falls back to its no-backend result.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn clip<'a>(&self, output: &'a str) -> &'a str {
        if output.len() <= self.max_output_chars {
            return output;
        }
        let mut end = self.max_output_chars;
        while !output.is_char_boundary(end) {
            end -= 1;
        }
        &output[..end]
    }

    async fn ask(&self, system: &str, user: String) -> Result<String, String> {
        if self.cancel.is_cancelled() {
            return Err("cancelled".into());
        }
        let request = CompletionRequest::new(
            self.model.clone(),
            vec![ChatMessage::system(system), ChatMessage::user(user)],
        );
        self.backend
            .complete(request, self.cancel.child_token())
            .await
            .map(|c| c.text)
            .map_err(|e| e.to_string())
    }
}

/// Parse a YES/NO verdict; `None` when the reply is neither.
fn parse_verdict(reply: &str) -> Option<bool> {
    let word: String = reply
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    match word.as_str() {
        "YES" | "TRUE" | "RELEVANT" => Some(true),
        "NO" | "FALSE" | "IRRELEVANT" => Some(false),
        _ => None,
    }
}

#[async_trait]
impl ContextManager for LlmContextManager {
    async fn verify(&self, task: &str, output: &str) -> bool {
        let user = format!(
            "Task being solved: {}\n\nTool output:\n{}",
            task,
            self.clip(output)
        );
        for attempt in 0..=self.verify_retries {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.ask(VERIFY_SYSTEM_PROMPT, user.clone()).await {
                Ok(reply) => match parse_verdict(&reply) {
                    Some(verdict) => return verdict,
                    None => debug!("Unparseable relevance verdict: {:?}", reply),
                },
                Err(e) => warn!(
                    "Relevance check failed (attempt {}/{}): {}",
                    attempt + 1,
                    self.verify_retries + 1,
                    e
                ),
            }
        }
        debug!("Relevance check exhausted retries, accepting output");
        true
    }

    async fn summarize(&self, task: &str, output: &str, source: &str) -> String {
        let user = format!(
            "Task being solved: {}\nTool used: {}\nRaw tool output:\n{}",
            task,
            source,
            self.clip(output)
        );
        match self.ask(SUMMARIZE_SYSTEM_PROMPT, user).await {
            Ok(reply) => {
                let reply = reply.trim();
                if reply.is_empty() {
                    output.to_string()
                } else if reply.eq_ignore_ascii_case(NOTHING_RELEVANT) {
                    NOTHING_RELEVANT.to_string()
                } else {
                    reply.to_string()
                }
            }
            Err(e) => {
                warn!("Summarization failed, keeping original output: {}", e);
                output.to_string()
            }
        }
    }
}
