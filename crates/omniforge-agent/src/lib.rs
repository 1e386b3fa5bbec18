//! Skill execution engine for OmniForge.
//!
//! Given a skill name and a user request, the engine loads the skill,
//! preprocesses its content, and runs it either as a single reasoning call
//! or as a ReAct loop that reasons, calls tools, observes and repeats until
//! it can answer.  Progress is streamed as [`TaskEvent`]s.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ SkillOrchestrator │────>│   Executor   │────>│ ToolExecutor │
//! │ (load, prepare)   │     │ (ReAct loop) │     │ (skill stack)│
//! └─────────┬─────────┘     └──────┬───────┘     └──────┬───────┘
//!           │                      │                    │
//!           └──── nested skill ────┤             ┌──────┴───────┐
//!                                  │             │ScriptExecutor│
//!                         ┌────────┴────────┐    │  (sandbox)   │
//!                         │ ReasoningEngine │    └──────────────┘
//!                         │   (Anthropic)   │
//!                         └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`orchestrator`] -- Entry point: mode and context resolution, nesting.
//! - [`autonomous`] -- The ReAct loop with retries and error recovery.
//! - [`simple`] -- One-shot execution without tools.
//! - [`tools`] -- Tool executor, skill stack and tool restrictions.
//! - [`llm`] -- The reasoning boundary and its Anthropic implementation.
//! - [`context`] -- Depth tracking for forked and nested runs.
//! - [`events`] -- The task event stream.
//! - [`config`] -- Platform configuration.
//! - [`error`] -- Agent error types.

pub mod autonomous;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod llm;
pub mod orchestrator;
pub mod run;
pub mod simple;
pub mod state;
pub mod tools;

// Re-export the most commonly used types at the crate root.
pub use autonomous::{AutonomousSkillExecutor, SkillInvoker};
pub use config::{
    AutonomousConfig, DEFAULT_CONFIG_PATH, DEFAULT_MODEL, InjectionConfig, LimitsConfig,
    OrchestratorConfig, PlatformConfig, PricingConfig, parse_duration_ms,
};
pub use context::{DEFAULT_MAX_DEPTH, ExecutionContext, child_iteration_budget};
pub use error::{AgentError, Result};
pub use events::{EventSender, MessagePart, TaskEvent, TaskEventStream, TaskState, event_channel};
pub use llm::{AnthropicConfig, AnthropicEngine, ReasoningEngine};
pub use orchestrator::{ExecutionRequest, ExecutionSink, SkillOrchestrator};
pub use run::{RetryPolicy, SkillRun};
pub use simple::SimpleSkillExecutor;
pub use state::{ExecutionMetrics, ExecutionResult, ExecutionState, Observation};
pub use tools::{
    ActiveSkillGuard, LOAD_FILE_TOOL, RUN_SCRIPT_TOOL, SKILL_TOOL, SkillStackEntry, ToolAdapter,
    ToolExecutor, ToolExecutorStats, ToolResult,
};
