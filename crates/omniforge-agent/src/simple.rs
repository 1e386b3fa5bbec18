//! Simple mode: one reasoning call, no tools.
//!
//! A failed or timed-out call is retried with the same budget and backoff
//! as an autonomous iteration.

use std::sync::Arc;

use crate::config::PricingConfig;
use crate::events::{EventSender, TaskEvent, TaskState};
use crate::llm::{Message, ReasoningEngine, ReasoningOptions};
use crate::run::{RetryPolicy, SkillRun};
use crate::state::{ExecutionMetrics, ExecutionResult, ExecutionState};

/// Answers a request with a single engine call on the skill's prompt.
pub struct SimpleSkillExecutor {
    engine: Arc<dyn ReasoningEngine>,
    pricing: PricingConfig,
    retry: RetryPolicy,
}

impl SimpleSkillExecutor {
    pub fn new(engine: Arc<dyn ReasoningEngine>, pricing: PricingConfig) -> Self {
        Self {
            engine,
            pricing,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn execute(&self, run: SkillRun<'_>, events: &EventSender) -> ExecutionResult {
        let state = ExecutionState::new();
        let mut metrics = ExecutionMetrics {
            iterations: 1,
            ..ExecutionMetrics::default()
        };
        events.emit(TaskEvent::status(TaskState::Working));

        let transcript = [
            Message::system(run.prepared.context.skill_content.clone()),
            Message::user(run.request),
        ];
        let options = ReasoningOptions {
            model: run.config.model.clone(),
            temperature: run.config.temperature,
            max_tokens: run.config.max_tokens,
        };

        let mut delay = self.retry.initial_delay;
        let mut attempts = 0;
        let outcome = loop {
            attempts += 1;
            let call = tokio::time::timeout(
                run.config.iteration_timeout(),
                self.engine.call_llm(&transcript, &[], &options),
            );
            let result = tokio::select! {
                biased;
                () = run.cancelled() => break None,
                r = call => r,
            };
            let (code, reason) = match result {
                Ok(Ok(response)) => break Some(Ok(response)),
                Ok(Err(e)) => (e.code(), e.to_string()),
                Err(_) => (
                    "timeout",
                    format!(
                        "reasoning call timed out after {}ms",
                        run.config.timeout_per_iteration_ms
                    ),
                ),
            };

            metrics.reasoning_failures += 1;
            tracing::warn!(task_id = %run.task_id, attempts, error = %reason, "reasoning call failed");
            if attempts > run.config.max_retries_per_tool {
                break Some(Err((code, reason)));
            }
            tokio::select! {
                biased;
                () = run.cancelled() => break None,
                () = tokio::time::sleep(delay) => {}
            }
            delay = self.retry.next_delay(delay);
        };

        let (final_state, output, error) = match outcome {
            None => (TaskState::Cancelled, None, None),
            Some(Ok(response)) => {
                metrics.add_usage(response.usage);
                events.emit(TaskEvent::answer(response.content.clone()));
                (TaskState::Completed, Some(response.content), None)
            }
            Some(Err((code, reason))) => {
                events.emit(TaskEvent::error(code, reason.clone()));
                (TaskState::Failed, None, Some(reason))
            }
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
            duration_ms = metrics.duration_ms,
            "simple execution finished"
        );

        ExecutionResult {
            task_id: run.task_id.to_owned(),
            skill_name: run.skill.name.clone(),
            final_state,
            output,
            error,
            metrics,
            loaded_files: Vec::new(),
        }
    }
}
