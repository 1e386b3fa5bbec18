//! Per-run mutable state and the final result summary.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::TaskState;
use crate::llm::Usage;

/// Longest observation excerpt kept as a partial result.
const PARTIAL_RESULT_CHARS: usize = 500;

/// One recorded tool round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub iteration: u32,
    pub tool: String,
    pub arguments: Value,
    pub success: bool,
    pub output: String,
}

/// Mutable state of one autonomous run.
#[derive(Debug, Clone)]
pub struct ExecutionState {
    pub iteration: u32,
    pub observations: Vec<Observation>,
    /// Approach key (tool plus canonical arguments) to failure count.
    pub failure_counts: HashMap<String, u32>,
    /// Approaches that exhausted their retry budget.
    pub failed_approaches: HashSet<String>,
    pub loaded_files: BTreeSet<String>,
    pub partial_results: Vec<String>,
    pub error_count: u32,
    pub started_at: Instant,
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionState {
    pub fn new() -> Self {
        Self {
            iteration: 0,
            observations: Vec::new(),
            failure_counts: HashMap::new(),
            failed_approaches: HashSet::new(),
            loaded_files: BTreeSet::new(),
            partial_results: Vec::new(),
            error_count: 0,
            started_at: Instant::now(),
        }
    }

    /// Stable key identifying a tool call by name and arguments.
    pub fn approach_key(tool: &str, arguments: &Value) -> String {
        format!("{tool}:{arguments}")
    }

    /// Count one more failure for `key` and return the new total.
    pub fn record_failure(&mut self, key: &str) -> u32 {
        self.error_count += 1;
        let count = self.failure_counts.entry(key.to_owned()).or_insert(0);
        *count += 1;
        *count
    }

    /// Forget the failures counted against `key`.
    pub fn reset_failures(&mut self, key: &str) {
        self.failure_counts.remove(key);
    }

    pub fn mark_failed(&mut self, key: &str) {
        self.failed_approaches.insert(key.to_owned());
    }

    pub fn is_failed(&self, key: &str) -> bool {
        self.failed_approaches.contains(key)
    }

    pub fn record_observation(&mut self, observation: Observation) {
        if observation.success && !observation.output.trim().is_empty() {
            let excerpt: String = observation.output.chars().take(PARTIAL_RESULT_CHARS).collect();
            self.partial_results
                .push(format!("{}: {}", observation.tool, excerpt.trim()));
        }
        self.observations.push(observation);
    }

    pub fn has_progress(&self) -> bool {
        !self.partial_results.is_empty()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}

/// Counters accumulated over a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub iterations: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub estimated_cost_usd: f64,
    pub tool_calls: u32,
    pub successful_tool_calls: u32,
    pub failed_tool_calls: u32,
    pub reasoning_failures: u32,
    pub recoveries: u32,
    pub duration_ms: u64,
}

impl ExecutionMetrics {
    pub fn add_usage(&mut self, usage: Usage) {
        self.input_tokens += u64::from(usage.input_tokens);
        self.output_tokens += u64::from(usage.output_tokens);
    }

    pub fn record_tool(&mut self, success: bool) {
        self.tool_calls += 1;
        if success {
            self.successful_tool_calls += 1;
        } else {
            self.failed_tool_calls += 1;
        }
    }
}

/// Immutable summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub task_id: String,
    pub skill_name: String,
    pub final_state: TaskState,
    /// Final answer, or the partial-results summary on early termination.
    pub output: Option<String>,
    pub error: Option<String>,
    pub metrics: ExecutionMetrics,
    pub loaded_files: Vec<String>,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.final_state == TaskState::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failures_counted_per_approach() {
        let mut state = ExecutionState::new();
        let a = ExecutionState::approach_key("grep", &json!({"pattern": "x"}));
        let b = ExecutionState::approach_key("grep", &json!({"pattern": "y"}));
        assert_eq!(state.record_failure(&a), 1);
        assert_eq!(state.record_failure(&a), 2);
        assert_eq!(state.record_failure(&b), 1);
        assert_eq!(state.error_count, 3);
        assert!(!state.is_failed(&a));
        state.mark_failed(&a);
        assert!(state.is_failed(&a));
    }

    #[test]
    fn reset_restarts_the_count_for_one_key() {
        let mut state = ExecutionState::new();
        state.record_failure("reasoning");
        state.record_failure("reasoning");
        state.record_failure("other");
        state.reset_failures("reasoning");
        assert_eq!(state.record_failure("reasoning"), 1);
        assert_eq!(state.record_failure("other"), 2);
        assert_eq!(state.error_count, 5);
    }

    #[test]
    fn only_successful_output_counts_as_progress() {
        let mut state = ExecutionState::new();
        state.record_observation(Observation {
            iteration: 1,
            tool: "grep".into(),
            arguments: json!({}),
            success: false,
            output: "boom".into(),
        });
        assert!(!state.has_progress());
        state.record_observation(Observation {
            iteration: 2,
            tool: "grep".into(),
            arguments: json!({}),
            success: true,
            output: "3 matches".into(),
        });
        assert_eq!(state.partial_results, vec!["grep: 3 matches"]);
        assert_eq!(state.observations.len(), 2);
    }

    #[test]
    fn metrics_accumulate_usage() {
        let mut metrics = ExecutionMetrics::default();
        metrics.add_usage(Usage {
            input_tokens: 10,
            output_tokens: 4,
        });
        metrics.add_usage(Usage {
            input_tokens: 5,
            output_tokens: 1,
        });
        metrics.record_tool(true);
        metrics.record_tool(false);
        assert_eq!((metrics.input_tokens, metrics.output_tokens), (15, 5));
        assert_eq!(metrics.tool_calls, 2);
        assert_eq!(metrics.failed_tool_calls, 1);
    }
}
