//! Autonomous mode: the reason/act/observe loop.
//!
//! Each iteration asks the [`ReasoningEngine`] for the next step given the
//! transcript so far.  A response without tool calls is the final answer;
//! otherwise every proposed call is authorized against the skill stack,
//! executed, and fed back as an observation.
//!
//! Failures are tracked per approach (tool name plus arguments).  A failed
//! reasoning call or a timed-out iteration is transient and retried with
//! backoff; a tool call that keeps failing is marked as a failed approach
//! and the engine is told to try something else.  When the budget runs out
//! the run either fails or, if it already produced results, finishes early
//! with a summary of them.

use std::sync::Arc;

use async_trait::async_trait;
use omniforge_skills::{ContextLoader, PreparedSkill, SkillError};
use serde_json::json;

use crate::config::{AutonomousConfig, PricingConfig};
use crate::context::ExecutionContext;
use crate::error::{AgentError, Result};
use crate::events::{EventSender, MessagePart, TaskEvent, TaskState};
use crate::llm::{Message, ReasoningEngine, ReasoningOptions, ToolCall, ToolDefinition, Usage};
use crate::run::{RetryPolicy, SkillRun};
use crate::state::{ExecutionMetrics, ExecutionResult, ExecutionState, Observation};
use crate::tools::{
    LOAD_FILE_TOOL, SKILL_TOOL, ToolExecutor, ToolResult, load_file_definition, skill_definition,
};

/// Failure key for reasoning calls that error out.
const REASONING_APPROACH: &str = "reasoning";
/// Failure key for iterations that exceed their time budget.
const TIMEOUT_APPROACH: &str = "iteration_timeout";

// ---------------------------------------------------------------------------
// Sub-skill delegation
// ---------------------------------------------------------------------------

/// Runs another skill on behalf of the `skill` tool.
#[async_trait]
pub trait SkillInvoker: Send + Sync {
    /// Run `skill_name` as a child of `parent`, sharing `tools`, and return
    /// its final answer.
    async fn invoke_skill(
        &self,
        skill_name: &str,
        request: &str,
        parent: &ExecutionContext,
        tools: Arc<ToolExecutor>,
    ) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Loop internals
// ---------------------------------------------------------------------------

/// A tool call together with its outcome.
struct ExecutedCall {
    call: ToolCall,
    approach: String,
    result: ToolResult,
    loaded_file: Option<String>,
}

/// What one iteration produced.  Applied to the transcript only after the
/// whole iteration finished within its time budget.
enum Step {
    Final {
        content: String,
        usage: Usage,
    },
    Acted {
        thought: String,
        calls: Vec<ExecutedCall>,
        usage: Usage,
    },
}

/// Why the loop stopped.
enum Outcome {
    Answer(String),
    IterationCap,
    Exhausted(String),
    Cancelled,
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Runs a skill through the ReAct loop.
pub struct AutonomousSkillExecutor {
    engine: Arc<dyn ReasoningEngine>,
    tools: Arc<ToolExecutor>,
    context_loader: ContextLoader,
    invoker: Option<Arc<dyn SkillInvoker>>,
    pricing: PricingConfig,
    retry: RetryPolicy,
}

impl AutonomousSkillExecutor {
    pub fn new(engine: Arc<dyn ReasoningEngine>, tools: Arc<ToolExecutor>) -> Self {
        Self {
            engine,
            tools,
            context_loader: ContextLoader::new(),
            invoker: None,
            pricing: PricingConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Enable the `skill` tool.
    pub fn with_invoker(mut self, invoker: Arc<dyn SkillInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    pub fn with_pricing(mut self, pricing: PricingConfig) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run the loop to a terminal state, emitting events as it goes.
    pub async fn execute(&self, run: SkillRun<'_>, events: &EventSender) -> ExecutionResult {
        let config = run.config;
        let mut state = ExecutionState::new();
        let mut metrics = ExecutionMetrics::default();
        let mut delay = self.retry.initial_delay;

        let tools = self.tools.tool_definitions(self.builtin_definitions(run.prepared));
        let options = ReasoningOptions {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };
        let mut transcript = vec![
            Message::system(system_prompt(run.prepared, config)),
            Message::user(run.request),
        ];

        tracing::info!(
            task_id = %run.task_id,
            skill = %run.skill.name,
            depth = run.context.depth,
            max_iterations = config.max_iterations,
            tool_count = tools.len(),
            "starting autonomous execution"
        );
        events.emit(TaskEvent::status(TaskState::Working));

        let outcome = loop {
            if run.is_cancelled() {
                break Outcome::Cancelled;
            }
            if state.iteration >= config.max_iterations {
                break Outcome::IterationCap;
            }
            state.iteration += 1;
            metrics.iterations = state.iteration;
            tracing::debug!(task_id = %run.task_id, iteration = state.iteration, "iteration start");

            let step = tokio::time::timeout(
                config.iteration_timeout(),
                self.step(&transcript, &tools, &options, &state, &run),
            );
            let result = tokio::select! {
                biased;
                () = run.cancelled() => break Outcome::Cancelled,
                r = step => r,
            };

            let failure = match result {
                Ok(Ok(Step::Final { content, usage })) => {
                    metrics.add_usage(usage);
                    break Outcome::Answer(content);
                }
                Ok(Ok(Step::Acted {
                    thought,
                    calls,
                    usage,
                })) => {
                    metrics.add_usage(usage);
                    // The retry budget covers consecutive failures only.
                    delay = self.retry.initial_delay;
                    state.reset_failures(REASONING_APPROACH);
                    state.reset_failures(TIMEOUT_APPROACH);
                    let abort = self.observe(
                        thought,
                        calls,
                        &mut transcript,
                        &mut state,
                        &mut metrics,
                        config,
                        events,
                    );
                    match abort {
                        Some(reason) => break Outcome::Exhausted(reason),
                        None => continue,
                    }
                }
                Ok(Err(e)) => (REASONING_APPROACH, e.to_string()),
                Err(_) => (
                    TIMEOUT_APPROACH,
                    format!(
                        "iteration exceeded {}ms",
                        config.timeout_per_iteration_ms
                    ),
                ),
            };

            // Transient failure of the whole iteration.
            let (approach, reason) = failure;
            metrics.reasoning_failures += 1;
            let attempts = state.record_failure(approach);
            tracing::warn!(
                task_id = %run.task_id,
                iteration = state.iteration,
                attempts,
                error = %reason,
                "iteration failed"
            );
            if attempts > config.max_retries_per_tool {
                break Outcome::Exhausted(format!(
                    "giving up after {attempts} failed attempts: {reason}"
                ));
            }
            tokio::select! {
                biased;
                () = run.cancelled() => break Outcome::Cancelled,
                () = tokio::time::sleep(delay) => {}
            }
            delay = self.retry.next_delay(delay);
        };

        self.finish(outcome, &run, state, metrics, events)
    }

    /// One reasoning call plus execution of any proposed tool calls.
    async fn step(
        &self,
        transcript: &[Message],
        tools: &[ToolDefinition],
        options: &ReasoningOptions,
        state: &ExecutionState,
        run: &SkillRun<'_>,
    ) -> Result<Step> {
        let response = self.engine.call_llm(transcript, tools, options).await?;
        if response.is_final() {
            return Ok(Step::Final {
                content: response.content,
                usage: response.usage,
            });
        }

        let mut calls = Vec::with_capacity(response.tool_calls.len());
        for call in response.tool_calls {
            let approach = ExecutionState::approach_key(&call.name, &call.arguments);
            let (result, loaded_file) = if state.is_failed(&approach) {
                let result = ToolResult::denied(
                    "This exact call already failed repeatedly and will not be run again. \
                     Choose a different approach.",
                );
                (result, None)
            } else {
                self.dispatch(&call, run).await
            };
            calls.push(ExecutedCall {
                call,
                approach,
                result,
                loaded_file,
            });
        }

        Ok(Step::Acted {
            thought: response.content,
            calls,
            usage: response.usage,
        })
    }

    async fn dispatch(&self, call: &ToolCall, run: &SkillRun<'_>) -> (ToolResult, Option<String>) {
        tracing::debug!(task_id = %run.task_id, tool = %call.name, id = %call.id, "executing tool");

        match call.name.as_str() {
            LOAD_FILE_TOOL => {
                if let Err(denied) = self.tools.authorize(LOAD_FILE_TOOL, &call.arguments) {
                    return (denied, None);
                }
                let Some(name) = call.arguments["name"].as_str() else {
                    return (ToolResult::failure("Missing required argument: name"), None);
                };
                match self
                    .context_loader
                    .load_file(&run.prepared.context, name)
                    .await
                {
                    Ok(body) => (ToolResult::ok(body), Some(name.to_owned())),
                    Err(e @ SkillError::FileNotCatalogued { .. }) => {
                        (ToolResult::denied(e.to_string()), None)
                    }
                    Err(e) => (ToolResult::failure(e.to_string()), None),
                }
            }
            SKILL_TOOL if self.invoker.is_some() => (self.delegate(call, run).await, None),
            _ => (
                self.tools
                    .execute(&call.name, call.arguments.clone(), run.context)
                    .await,
                None,
            ),
        }
    }

    async fn delegate(&self, call: &ToolCall, run: &SkillRun<'_>) -> ToolResult {
        if let Err(denied) = self.tools.authorize(SKILL_TOOL, &call.arguments) {
            return denied;
        }
        let Some(invoker) = &self.invoker else {
            return ToolResult::denied("Skill delegation is not available");
        };
        let Some(skill_name) = call.arguments["skill"].as_str() else {
            return ToolResult::failure("Missing required argument: skill");
        };
        let request = call.arguments["request"].as_str().unwrap_or_default();

        match invoker
            .invoke_skill(skill_name, request, run.context, Arc::clone(&self.tools))
            .await
        {
            Ok(answer) => ToolResult::ok(answer),
            Err(e @ (AgentError::RecursionLimit { .. } | AgentError::SkillNotFound { .. })) => {
                ToolResult::denied(e.to_string())
            }
            Err(e) => ToolResult::failure(e.to_string()),
        }
    }

    /// Apply an iteration's tool calls to the transcript and state.
    /// Returns a reason when the run cannot continue.
    #[allow(clippy::too_many_arguments)]
    fn observe(
        &self,
        thought: String,
        calls: Vec<ExecutedCall>,
        transcript: &mut Vec<Message>,
        state: &mut ExecutionState,
        metrics: &mut ExecutionMetrics,
        config: &AutonomousConfig,
        events: &EventSender,
    ) -> Option<String> {
        transcript.push(Message::assistant_tool_calls(
            thought,
            calls.iter().map(|c| c.call.clone()).collect(),
        ));

        let mut abort = None;
        for executed in calls {
            let ExecutedCall {
                call,
                approach,
                result,
                loaded_file,
            } = executed;
            let mut observation = result.observation();

            metrics.record_tool(result.success);
            if let Some(file) = loaded_file {
                state.loaded_files.insert(file);
            }

            if !result.success && !state.is_failed(&approach) {
                let attempts = state.record_failure(&approach);
                if !result.retryable || attempts > config.max_retries_per_tool {
                    state.mark_failed(&approach);
                    if !result.retryable {
                        observation.push_str("\n\n[Do not retry this call; choose another approach.]");
                    } else if config.enable_error_recovery {
                        metrics.recoveries += 1;
                        observation.push_str(&format!(
                            "\n\n[This call has failed {attempts} times and is now marked as a failed \
                             approach. Do not retry it; choose a different approach.]"
                        ));
                        tracing::info!(tool = %call.name, attempts, "steering away from failed approach");
                    } else {
                        abort.get_or_insert(format!(
                            "tool `{}` failed {attempts} times: {}",
                            call.name,
                            result.error.as_deref().unwrap_or("unknown error")
                        ));
                    }
                }
            }

            events.emit(TaskEvent::Message {
                parts: vec![MessagePart::Data {
                    data: json!({"tool": call.name, "success": result.success}),
                }],
                is_partial: true,
            });
            state.record_observation(Observation {
                iteration: state.iteration,
                tool: call.name.clone(),
                arguments: call.arguments.clone(),
                success: result.success,
                output: if result.success {
                    result.output.clone()
                } else {
                    observation.clone()
                },
            });
            transcript.push(Message::tool_result(call.id, observation));
        }
        abort
    }

    fn builtin_definitions(&self, prepared: &PreparedSkill) -> Vec<ToolDefinition> {
        let mut defs = Vec::new();
        if !prepared.context.available_files.is_empty() {
            defs.push(load_file_definition());
        }
        if self.invoker.is_some() {
            defs.push(skill_definition());
        }
        defs
    }

    fn finish(
        &self,
        outcome: Outcome,
        run: &SkillRun<'_>,
        state: ExecutionState,
        mut metrics: ExecutionMetrics,
        events: &EventSender,
    ) -> ExecutionResult {
        let early_exit = |reason: &str| {
            if run.config.early_termination && state.has_progress() {
                Some(partial_summary(reason, &state.partial_results))
            } else {
                None
            }
        };

        let (final_state, output, error) = match outcome {
            Outcome::Answer(answer) => {
                events.emit(TaskEvent::answer(answer.clone()));
                (TaskState::Completed, Some(answer), None)
            }
            Outcome::Cancelled => (TaskState::Cancelled, None, None),
            Outcome::IterationCap => {
                let reason = format!(
                    "reached the iteration limit ({}) without a final answer",
                    run.config.max_iterations
                );
                match early_exit(&reason) {
                    Some(summary) => {
                        events.emit(TaskEvent::answer(summary.clone()));
                        (TaskState::Completed, Some(summary), None)
                    }
                    None => {
                        events.emit(TaskEvent::error("max_iterations", reason.clone()));
                        (TaskState::Failed, None, Some(reason))
                    }
                }
            }
            Outcome::Exhausted(reason) => match early_exit(&reason) {
                Some(summary) => {
                    events.emit(TaskEvent::answer(summary.clone()));
                    (TaskState::Completed, Some(summary), Some(reason))
                }
                None => {
                    events.emit(TaskEvent::error("retries_exhausted", reason.clone()));
                    (TaskState::Failed, None, Some(reason))
                }
            },
        };
        events.emit(TaskEvent::done(final_state));

        metrics.duration_ms = state.elapsed_ms();
        metrics.estimated_cost_usd = self
            .pricing
            .estimate_usd(metrics.input_tokens, metrics.output_tokens);

        tracing::info!(
            task_id = %run.task_id,
            skill = %run.skill.name,
            state = ?final_state,
            iterations = metrics.iterations,
            tool_calls = metrics.tool_calls,
            failed_tool_calls = metrics.failed_tool_calls,
            recoveries = metrics.recoveries,
            input_tokens = metrics.input_tokens,
            output_tokens = metrics.output_tokens,
            cost_usd = metrics.estimated_cost_usd,
            duration_ms = metrics.duration_ms,
            "autonomous execution finished"
        );

        ExecutionResult {
            task_id: run.task_id.to_owned(),
            skill_name: run.skill.name.clone(),
            final_state,
            output,
            error,
            metrics,
            loaded_files: state.loaded_files.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

fn system_prompt(prepared: &PreparedSkill, config: &AutonomousConfig) -> String {
    let mut prompt = prepared.context.skill_content.trim_end().to_owned();
    let catalogue = prepared.context.catalogue();
    if !catalogue.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(catalogue.trim_end());
    }
    prompt.push_str(&format!(
        "\n\n## Execution\n\n\
         Work through the task step by step. Call tools when you need information or \
         need to act, and read each observation before deciding the next step. When the \
         task is complete, reply with the final answer and no tool calls. You have at \
         most {} steps.",
        config.max_iterations
    ));
    prompt
}

fn partial_summary(reason: &str, partial_results: &[String]) -> String {
    let mut out = format!("Stopped early ({reason}). Partial results:\n");
    for result in partial_results {
        out.push_str("- ");
        out.push_str(result);
        out.push('\n');
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use omniforge_skills::{FileReference, LoadedContext};

    use super::*;

    fn prepared(files: &[(&str, Option<u32>)]) -> PreparedSkill {
        let available_files: BTreeMap<String, FileReference> = files
            .iter()
            .map(|(name, lines)| {
                (
                    (*name).to_owned(),
                    FileReference {
                        path: PathBuf::from("/skill").join(name),
                        description: "reference".into(),
                        estimated_lines: *lines,
                    },
                )
            })
            .collect();
        PreparedSkill {
            context: LoadedContext {
                skill_content: "# Skill\n\nDo the work.\n".into(),
                available_files,
                skill_dir: PathBuf::from("/skill"),
                line_count: 3,
            },
            injections: Vec::new(),
            substitutions_made: 0,
            undefined_vars: Vec::new(),
        }
    }

    #[test]
    fn system_prompt_lists_files_and_step_budget() {
        let config = AutonomousConfig {
            max_iterations: 4,
            ..AutonomousConfig::default()
        };
        let prompt = system_prompt(&prepared(&[("guide.md", Some(40))]), &config);
        assert!(prompt.starts_with("# Skill\n\nDo the work.\n\n## Available supporting files"));
        assert!(prompt.contains("- `guide.md`: reference (~40 lines)"));
        assert!(prompt.contains("at most 4 steps"));
    }

    #[test]
    fn system_prompt_without_files_has_no_catalogue() {
        let prompt = system_prompt(&prepared(&[]), &AutonomousConfig::default());
        assert!(!prompt.contains("supporting files"));
        assert!(prompt.contains("## Execution"));
    }

    #[test]
    fn partial_summary_lists_results() {
        let summary = partial_summary("out of steps", &["echo: a".into(), "echo: b".into()]);
        assert_eq!(
            summary,
            "Stopped early (out of steps). Partial results:\n- echo: a\n- echo: b\n"
        );
    }
}
