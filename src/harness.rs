//! Checkpointed evaluation harness.
//!
//! Drives a [`Session`] (shared, or one per item) over a list of tasks.
//! After every item the harness appends a `{task, final_answer, full_trace}`
//! line to the results file and rewrites the checkpoint, so an interrupted
//! run resumes where it stopped.

use crate::session::Session;
use crate::types::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> HarnessError + '_ {
    move |source| HarnessError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// One dataset item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvalItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub task: String,
}

impl EvalItem {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            id: None,
            task: task.into(),
        }
    }
}

/// Progress marker persisted after every item.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checkpoint {
    pub items_evaluated: usize,
}

/// One line of the results file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvalRecord {
    pub task: String,
    pub final_answer: Value,
    pub full_trace: Vec<TraceEvent>,
}

/// What one `run` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalSummary {
    /// Items skipped because an earlier run already evaluated them.
    pub resumed_from: usize,
    /// Items evaluated by this call.
    pub evaluated: usize,
    /// Items whose final answer was an error payload.
    pub failed: usize,
    /// Items still pending (batch limit reached).
    pub remaining: usize,
}

pub struct EvaluationHarness {
    checkpoint_path: PathBuf,
    results_path: PathBuf,
    /// Items evaluated per `run` call; `None` means all remaining items.
    batch_limit: Option<usize>,
}

impl EvaluationHarness {
    pub fn new(checkpoint_path: impl Into<PathBuf>, results_path: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_path: checkpoint_path.into(),
            results_path: results_path.into(),
            batch_limit: None,
        }
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = Some(limit);
        self
    }

    /// Load the checkpoint; a missing file means nothing was evaluated yet.
    pub async fn load_checkpoint(&self) -> Result<Checkpoint, HarnessError> {
        match tokio::fs::read_to_string(&self.checkpoint_path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Checkpoint::default()),
            Err(e) => Err(io_error(&self.checkpoint_path)(e)),
        }
    }

    /// Write to a sibling temp file, then rename over the checkpoint.
    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), HarnessError> {
        let tmp = self.checkpoint_path.with_extension("tmp");
        let content = serde_json::to_string(&checkpoint)?;
        tokio::fs::write(&tmp, content)
            .await
            .map_err(io_error(&tmp))?;
        tokio::fs::rename(&tmp, &self.checkpoint_path)
            .await
            .map_err(io_error(&self.checkpoint_path))
    }

    async fn append_record(&self, record: &EvalRecord) -> Result<(), HarnessError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.results_path)
            .await
            .map_err(io_error(&self.results_path))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(io_error(&self.results_path))?;
        file.flush().await.map_err(io_error(&self.results_path))
    }

    /// Evaluate the items after the checkpoint, up to the batch limit.
    ///
    /// Every item runs through the same `session`, so its agents keep their
    /// state between items: a planner entry sees earlier items' observations
    /// and gets later items as follow-up tasks. Use [`run_with`] to start
    /// each item from fresh agents.
    ///
    /// [`run_with`]: EvaluationHarness::run_with
    pub async fn run(
        &self,
        session: &Session,
        items: &[EvalItem],
    ) -> Result<EvalSummary, HarnessError> {
        self.run_with(|| session.clone(), items).await
    }

    /// Like [`run`](EvaluationHarness::run), but builds a new session for
    /// every item with `make_session`.
    pub async fn run_with<F>(
        &self,
        mut make_session: F,
        items: &[EvalItem],
    ) -> Result<EvalSummary, HarnessError>
    where
        F: FnMut() -> Session,
    {
        let mut checkpoint = self.load_checkpoint().await?;
        let resumed_from = checkpoint.items_evaluated.min(items.len());
        checkpoint.items_evaluated = resumed_from;
        if resumed_from > 0 {
            info!("Resuming evaluation at item {}/{}", resumed_from, items.len());
        }

        let pending = &items[resumed_from..];
        let batch = self.batch_limit.unwrap_or(pending.len()).min(pending.len());
        let mut failed = 0;

        for item in &pending[..batch] {
            let session = make_session();
            let full_trace = session.forward_collect(Some(item.task.clone())).await;
            let final_answer = full_trace
                .iter()
                .rev()
                .find_map(|event| match &event.payload {
                    TracePayload::FinalAnswer(payload) => Some(payload.clone()),
                    _ => None,
                })
                .unwrap_or(Value::Null);
            if final_answer.get("error").is_some() || final_answer.is_null() {
                failed += 1;
                warn!(
                    "Item {} ended without an answer",
                    item.id.as_deref().unwrap_or(&item.task)
                );
            }

            self.append_record(&EvalRecord {
                task: item.task.clone(),
                final_answer,
                full_trace,
            })
            .await?;
            checkpoint.items_evaluated += 1;
            self.save_checkpoint(checkpoint).await?;
        }

        let summary = EvalSummary {
            resumed_from,
            evaluated: batch,
            failed,
            remaining: pending.len() - batch,
        };
        info!(
            "Evaluation batch done: {} evaluated, {} failed, {} remaining",
            summary.evaluated, summary.failed, summary.remaining
        );
        Ok(summary)
    }
}

/// Read every record from a results file.
pub async fn read_results(path: impl AsRef<Path>) -> Result<Vec<EvalRecord>, HarnessError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(io_error(path))?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(HarnessError::from))
        .collect()
}
