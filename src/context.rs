//! Context budgeting: token estimation, local truncation and execution limits.
//!
//! These are the backend-free building blocks. The LLM-driven compaction
//! lives in `context_manager`; `HeuristicContextManager` is built from the
//! helpers here.

use crate::types::*;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Token estimation
// ---------------------------------------------------------------------------

/// Rough token estimate: ~4 chars per token for English text.
/// Good enough for context budgeting.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Estimate tokens for one observation as rendered into a request.
pub fn observation_tokens(obs: &Observation) -> usize {
    estimate_tokens(&obs.result)
        + estimate_tokens(&obs.source)
        + estimate_tokens(&serde_json::Value::Object(obs.arguments.clone()).to_string())
        + 8
}

/// Estimate total tokens for a message list
pub fn total_tokens(messages: &[ChatMessage]) -> usize {
    messages
        .iter()
        .map(|m| estimate_tokens(&m.content) + 4)
        .sum()
}

// ---------------------------------------------------------------------------
// Local compaction
// ---------------------------------------------------------------------------

/// Keep the first and last `max_lines / 2` lines of a tool output, replacing
/// the middle with a marker naming how many lines were cut.
pub fn truncate_text_head_tail(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max_lines {
        return text.to_string();
    }

    let keep_head = max_lines / 2;
    let keep_tail = max_lines - keep_head;
    let cut = lines.len() - max_lines;

    format!(
        "{}\n\n[... {} lines truncated ...]\n\n{}",
        lines[..keep_head].join("\n"),
        cut,
        lines[lines.len() - keep_tail..].join("\n")
    )
}

/// Positions of the newest observations that fit within `budget` tokens.
///
/// The newest observation is always kept, even when it alone exceeds the
/// budget, so a non-empty log never compacts to nothing.
pub fn keep_within_budget(observations: &[Observation], budget: usize) -> BTreeSet<usize> {
    let mut keep = BTreeSet::new();
    let mut remaining = budget;

    for (position, obs) in observations.iter().enumerate().rev() {
        let tokens = observation_tokens(obs);
        if tokens > remaining {
            if keep.is_empty() {
                keep.insert(position);
            }
            break;
        }
        remaining -= tokens;
        keep.insert(position);
    }

    keep
}

// ---------------------------------------------------------------------------
// Execution limits
// ---------------------------------------------------------------------------

/// Caps on a single `forward` invocation. Exceeding either ends the run
/// with a `limit_exceeded` error payload.
#[derive(Debug, Clone)]
pub struct ExecutionLimits {
    /// Backend calls that produced an action
    pub max_turns: usize,
    /// Wall-clock budget
    pub max_duration: Duration,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_turns: 50,
            max_duration: Duration::from_secs(600),
        }
    }
}

/// Turn counter and clock for one invocation.
pub struct ExecutionTracker {
    limits: ExecutionLimits,
    turns: usize,
    started_at: Instant,
}

impl ExecutionTracker {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self {
            limits,
            turns: 0,
            started_at: Instant::now(),
        }
    }

    pub fn record_turn(&mut self) {
        self.turns += 1;
    }

    pub fn turns(&self) -> usize {
        self.turns
    }

    /// Why the invocation must stop, if it must.
    pub fn check_limits(&self) -> Option<String> {
        if self.turns >= self.limits.max_turns {
            return Some(format!(
                "turn limit of {} reached",
                self.limits.max_turns
            ));
        }
        let elapsed = self.started_at.elapsed();
        (elapsed >= self.limits.max_duration).then(|| {
            format!(
                "time limit of {}s reached after {:.1}s",
                self.limits.max_duration.as_secs(),
                elapsed.as_secs_f64()
            )
        })
    }
}
