//! Execution context for nested skill runs.
//!
//! Every run carries an [`ExecutionContext`].  Forked and nested runs derive
//! a child context one level deeper; depth can never exceed `max_depth`.

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

/// Default maximum nesting depth for forked skills.
pub const DEFAULT_MAX_DEPTH: u32 = 3;

/// Smallest iteration budget a child run is ever given.
pub const MIN_CHILD_ITERATIONS: u32 = 3;

/// Position of a run within a tree of nested skill executions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub task_id: String,
    /// 0 for the root run.
    pub depth: u32,
    pub max_depth: u32,
    pub parent_task_id: Option<String>,
    pub root_task_id: String,
    /// Skill names from the root down to this run.
    pub skill_chain: Vec<String>,
}

impl ExecutionContext {
    /// Context for a top-level run.
    pub fn root(task_id: impl Into<String>, max_depth: u32) -> Self {
        let task_id = task_id.into();
        Self {
            root_task_id: task_id.clone(),
            task_id,
            depth: 0,
            max_depth,
            parent_task_id: None,
            skill_chain: Vec::new(),
        }
    }

    /// Derive the context for a sub-agent run of `skill_name`.
    ///
    /// Fails with [`AgentError::RecursionLimit`] when no depth remains.
    pub fn create_child_context(
        &self,
        child_task_id: impl Into<String>,
        skill_name: &str,
    ) -> Result<Self> {
        if !self.can_fork() {
            return Err(AgentError::RecursionLimit {
                depth: self.depth,
                max_depth: self.max_depth,
            });
        }
        let mut skill_chain = self.skill_chain.clone();
        skill_chain.push(skill_name.to_owned());
        Ok(Self {
            task_id: child_task_id.into(),
            depth: self.depth + 1,
            max_depth: self.max_depth,
            parent_task_id: Some(self.task_id.clone()),
            root_task_id: self.root_task_id.clone(),
            skill_chain,
        })
    }

    /// Record `skill_name` as the skill running in this context.
    pub fn entering(mut self, skill_name: &str) -> Self {
        if self.skill_chain.last().map(String::as_str) != Some(skill_name) {
            self.skill_chain.push(skill_name.to_owned());
        }
        self
    }

    pub fn can_fork(&self) -> bool {
        self.depth < self.max_depth
    }

    pub fn remaining_depth(&self) -> u32 {
        self.max_depth.saturating_sub(self.depth)
    }

    pub fn is_root(&self) -> bool {
        self.depth == 0
    }
}

/// Iteration budget for a run at `child_depth`: the base budget halved per
/// level, never below [`MIN_CHILD_ITERATIONS`].
pub fn child_iteration_budget(base: u32, child_depth: u32) -> u32 {
    base.checked_shr(child_depth)
        .unwrap_or(0)
        .max(MIN_CHILD_ITERATIONS)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
