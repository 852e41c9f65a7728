//! Per-agent observation log.

use crate::types::*;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Observations owned by one agent instance, in the order they were recorded.
///
/// The iteration counter only moves forward: clearing, pruning, or
/// retaining entries never rewinds it.
#[derive(Debug, Clone, Default)]
pub struct ObservationLog {
    entries: Vec<Observation>,
    next_iteration: usize,
}

impl ObservationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation at the current iteration and advance the counter.
    pub fn record(
        &mut self,
        source: impl Into<String>,
        kind: ObservationKind,
        arguments: Map<String, Value>,
        result: impl Into<String>,
        is_error: bool,
    ) -> &Observation {
        let iteration = self.next_iteration;
        self.entries.push(Observation {
            iteration,
            source: source.into(),
            kind,
            result: result.into(),
            arguments,
            is_error,
        });
        self.next_iteration += 1;
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[Observation] {
        &self.entries
    }

    pub fn last(&self) -> Option<&Observation> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iteration the next recorded observation will carry.
    pub fn iteration(&self) -> usize {
        self.next_iteration
    }

    /// Replace the newest observation's result in place.
    pub fn replace_last_result(&mut self, result: String) -> bool {
        match self.entries.last_mut() {
            Some(last) => {
                last.result = result;
                true
            }
            None => false,
        }
    }

    pub fn drop_last(&mut self) -> Option<Observation> {
        self.entries.pop()
    }

    /// Keep only the entries whose positions are in `keep`.
    pub fn retain_positions(&mut self, keep: &BTreeSet<usize>) {
        let mut position = 0;
        self.entries.retain(|_| {
            let kept = keep.contains(&position);
            position += 1;
            kept
        });
    }

    /// Remove every observation recorded at `iteration`; returns how many went.
    pub fn delete_iteration(&mut self, iteration: usize) -> usize {
        let before = self.entries.len();
        self.entries.retain(|o| o.iteration != iteration);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Render all observations into one assistant message, or nothing when empty.
    pub fn render(&self) -> Option<ChatMessage> {
        if self.entries.is_empty() {
            return None;
        }
        let lines: Vec<String> = self.entries.iter().map(render_line).collect();
        Some(ChatMessage::assistant(format!(
            "Observations so far:\n{}",
            lines.join("\n")
        )))
    }
}

fn render_line(o: &Observation) -> String {
    let marker = if o.is_error { " [error]" } else { "" };
    format!(
        "Iteration [{}] | {}- given to act: {}{} → {}",
        o.iteration,
        o.source,
        Value::Object(o.arguments.clone()),
        marker,
        o.result
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(task: &str) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("query".into(), Value::String(task.into()));
        m
    }

    #[test]
    fn test_record_advances_iteration() {
        let mut log = ObservationLog::new();
        log.record("web_search", ObservationKind::Tool, args("a"), "r0", false);
        log.record("browser_user", ObservationKind::Agent, args("b"), "r1", false);

        let iterations: Vec<usize> = log.entries().iter().map(|o| o.iteration).collect();
        assert_eq!(iterations, vec![0, 1]);
        assert_eq!(log.iteration(), 2);

        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.iteration(), 2, "clearing never rewinds the counter");
    }

    #[test]
    fn test_retain_positions_and_delete_iteration() {
        let mut log = ObservationLog::new();
        for i in 0..4 {
            log.record("t", ObservationKind::Tool, Map::new(), format!("r{}", i), false);
        }
        log.retain_positions(&BTreeSet::from([1, 3]));
        let results: Vec<&str> = log.entries().iter().map(|o| o.result.as_str()).collect();
        assert_eq!(results, vec!["r1", "r3"]);

        assert_eq!(log.delete_iteration(3), 1);
        assert_eq!(log.delete_iteration(3), 0);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_render() {
        let mut log = ObservationLog::new();
        assert!(log.render().is_none());

        log.record("web_search", ObservationKind::Tool, args("rust"), "found it", false);
        log.record("python", ObservationKind::Tool, Map::new(), "boom", true);
        let msg = log.render().unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.content.starts_with("Observations so far:\n"));
        assert!(msg
            .content
            .contains(r#"Iteration [0] | web_search- given to act: {"query":"rust"} → found it"#));
        assert!(msg.content.contains("Iteration [1] | python- given to act: {} [error] → boom"));
    }
}
