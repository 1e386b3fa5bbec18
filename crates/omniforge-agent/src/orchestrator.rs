//! Skill orchestrator -- the single entry point for running a skill.
//!
//! The orchestrator resolves a skill, decides how to run it (simple or
//! autonomous, inherited or forked context), prepares its content, and
//! streams [`TaskEvent`]s back to the caller while the run proceeds in its
//! own tokio task.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use omniforge_sandbox::ScriptExecutor;
use omniforge_skills::{
    ContextMode, ExecutionMode, Preprocessor, Skill, SkillLoader, SubstitutionContext,
};
use tokio::sync::watch;
use uuid::Uuid;

use crate::autonomous::{AutonomousSkillExecutor, SkillInvoker};
use crate::config::{AutonomousConfig, PlatformConfig};
use crate::context::{ExecutionContext, child_iteration_budget};
use crate::error::{AgentError, Result};
use crate::events::{EventSender, MessagePart, TaskEvent, TaskEventStream, TaskState, event_channel};
use crate::llm::ReasoningEngine;
use crate::run::{RetryPolicy, SkillRun};
use crate::simple::SimpleSkillExecutor;
use crate::state::{ExecutionMetrics, ExecutionResult};
use crate::tools::{ToolAdapter, ToolExecutor};

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Parameters of one skill execution.
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    pub skill_name: String,
    pub user_request: String,
    /// Generated when absent.
    pub task_id: Option<String>,
    pub session_id: Option<String>,
    pub tenant_id: Option<String>,
    pub mode_override: Option<ExecutionMode>,
    /// Overrides the skill's `context` metadata.
    pub context: Option<ContextMode>,
    /// Set for nested calls; the run becomes a child of this context.
    pub parent: Option<ExecutionContext>,
    /// Shared stack for nested calls.  Root runs get a fresh one.
    pub tool_executor: Option<Arc<ToolExecutor>>,
    pub workspace: Option<PathBuf>,
    pub user: Option<String>,
    pub variables: HashMap<String, String>,
    pub cancel: Option<watch::Receiver<bool>>,
}

impl ExecutionRequest {
    pub fn new(skill_name: impl Into<String>, user_request: impl Into<String>) -> Self {
        Self {
            skill_name: skill_name.into(),
            user_request: user_request.into(),
            ..Self::default()
        }
    }

    pub fn with_task_id(mut self, id: impl Into<String>) -> Self {
        self.task_id = Some(id.into());
        self
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_tenant_id(mut self, id: impl Into<String>) -> Self {
        self.tenant_id = Some(id.into());
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode_override = Some(mode);
        self
    }

    pub fn with_context(mut self, context: ContextMode) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_parent(mut self, parent: ExecutionContext) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_tool_executor(mut self, tools: Arc<ToolExecutor>) -> Self {
        self.tool_executor = Some(tools);
        self
    }

    pub fn with_workspace(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workspace = Some(dir.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn substitution_context(&self, skill: &Skill) -> SubstitutionContext {
        let mut vars = SubstitutionContext::new(self.user_request.clone())
            .with_skill_dir(skill.skill_dir.clone());
        if let Some(id) = &self.session_id {
            vars = vars.with_session_id(id.clone());
        }
        if let Some(id) = &self.tenant_id {
            vars = vars.with_tenant_id(id.clone());
        }
        if let Some(dir) = &self.workspace {
            vars = vars.with_workspace(dir.clone());
        }
        if let Some(user) = &self.user {
            vars = vars.with_user(user.clone());
        }
        for (name, value) in &self.variables {
            vars = vars.with_var(name.clone(), value.clone());
        }
        vars
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Receives every finished run, after its `done` event.
#[async_trait]
pub trait ExecutionSink: Send + Sync {
    async fn record(&self, result: &ExecutionResult);
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Everything a spawned run owns.
struct Job {
    skill: Skill,
    mode: ExecutionMode,
    config: AutonomousConfig,
    context: ExecutionContext,
    task_id: String,
    request: ExecutionRequest,
    tools: Arc<ToolExecutor>,
}

enum Launch {
    /// Refused before running; the stream already holds its terminal events.
    Finished(TaskEventStream),
    Ready {
        job: Job,
        events: EventSender,
        stream: TaskEventStream,
    },
}

/// Resolves, prepares and runs skills.
pub struct SkillOrchestrator {
    loader: Arc<dyn SkillLoader>,
    engine: Arc<dyn ReasoningEngine>,
    adapters: Vec<Arc<dyn ToolAdapter>>,
    scripts: Arc<ScriptExecutor>,
    preprocessor: Preprocessor,
    config: PlatformConfig,
    sink: Option<Arc<dyn ExecutionSink>>,
    retry: RetryPolicy,
}

impl SkillOrchestrator {
    pub fn new(
        loader: Arc<dyn SkillLoader>,
        engine: Arc<dyn ReasoningEngine>,
        config: PlatformConfig,
    ) -> Self {
        Self {
            loader,
            engine,
            adapters: Vec::new(),
            scripts: Arc::new(ScriptExecutor::new(config.sandbox.clone())),
            preprocessor: Preprocessor::new(config.injection.injector()),
            config,
            sink: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Register a tool adapter for every future execution.
    pub fn with_adapter(mut self, adapter: Arc<dyn ToolAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ExecutionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    /// A tool executor with no active skills.
    pub fn new_tool_executor(&self) -> Arc<ToolExecutor> {
        Arc::new(ToolExecutor::new(
            self.adapters.clone(),
            Arc::clone(&self.scripts),
        ))
    }

    /// Start executing a skill.
    ///
    /// Fails before any event is produced if the skill cannot be loaded.
    /// Everything after that, including a fork past the depth limit, is
    /// reported through the returned stream, which always ends with `done`.
    pub async fn execute(self: &Arc<Self>, request: ExecutionRequest) -> Result<TaskEventStream> {
        match self.launch(request).await? {
            Launch::Finished(stream) => Ok(stream),
            Launch::Ready { job, events, stream } => {
                let orchestrator = Arc::clone(self);
                tokio::spawn(async move {
                    orchestrator.run_to_end(job, events).await;
                });
                Ok(stream)
            }
        }
    }

    /// Run a prepared job in the calling task, then record it.
    ///
    /// Dropping this future drops the job's skill guard, and those of any
    /// skills it delegated to, innermost first.
    async fn run_to_end(self: &Arc<Self>, job: Job, events: EventSender) {
        let result = self.run(job, &events).await;
        drop(events);
        self.record(&result).await;
    }

    /// Load and resolve a request up to the point where it can run.
    async fn launch(&self, request: ExecutionRequest) -> Result<Launch> {
        let skill = self
            .loader
            .load_skill(&request.skill_name)
            .await
            .map_err(AgentError::from_load)?;

        let mode = resolve_mode(request.mode_override, &skill);
        let context_mode = resolve_context(request.context, &skill);
        let mut config =
            AutonomousConfig::for_skill(&self.config.autonomous, &skill.metadata, &self.config.limits);
        let task_id = request
            .task_id
            .clone()
            .unwrap_or_else(|| Uuid::now_v7().to_string());
        let (tx, stream) = event_channel();

        let nested = request.parent.is_some();
        let base = request.parent.clone().unwrap_or_else(|| {
            ExecutionContext::root(task_id.clone(), self.config.orchestrator.max_depth)
        });
        let context = if nested || context_mode == ContextMode::Fork {
            let child_id = if nested {
                task_id.clone()
            } else {
                Uuid::now_v7().to_string()
            };
            match base.create_child_context(child_id, &skill.name) {
                Ok(child) => {
                    config.max_iterations = child_iteration_budget(config.max_iterations, child.depth);
                    child
                }
                Err(e) => {
                    tracing::warn!(
                        task_id = %task_id,
                        skill = %skill.name,
                        depth = base.depth,
                        max_depth = base.max_depth,
                        "fork refused: recursion limit reached"
                    );
                    tx.emit(TaskEvent::error(e.code(), e.to_string()));
                    tx.emit(TaskEvent::done(TaskState::Failed));
                    drop(tx);
                    self.record(&ExecutionResult {
                        task_id,
                        skill_name: skill.name,
                        final_state: TaskState::Failed,
                        output: None,
                        error: Some(e.to_string()),
                        metrics: ExecutionMetrics::default(),
                        loaded_files: Vec::new(),
                    })
                    .await;
                    return Ok(Launch::Finished(stream));
                }
            }
        } else {
            base.entering(&skill.name)
        };

        let tools = request
            .tool_executor
            .clone()
            .unwrap_or_else(|| self.new_tool_executor());

        tracing::info!(
            task_id = %task_id,
            skill = %skill.name,
            mode = %mode,
            context = ?context_mode,
            depth = context.depth,
            max_iterations = config.max_iterations,
            "skill execution started"
        );

        let job = Job {
            skill,
            mode,
            config,
            context,
            task_id,
            request,
            tools,
        };
        Ok(Launch::Ready {
            job,
            events: tx,
            stream,
        })
    }

    /// Body of a run.  The skill stays active exactly as long as this
    /// function runs.
    async fn run(self: &Arc<Self>, job: Job, events: &EventSender) -> ExecutionResult {
        let _active = job.tools.activate_scoped(&job.skill);

        let vars = job.request.substitution_context(&job.skill);
        let prepared = self.preprocessor.prepare(&job.skill, &vars).await;
        if !prepared.undefined_vars.is_empty() {
            tracing::debug!(
                task_id = %job.task_id,
                undefined = ?prepared.undefined_vars,
                "skill content has unresolved placeholders"
            );
        }

        let run = SkillRun {
            task_id: &job.task_id,
            skill: &job.skill,
            prepared: &prepared,
            request: &job.request.user_request,
            config: &job.config,
            context: &job.context,
            cancel: job.request.cancel.clone(),
        };

        match job.mode {
            ExecutionMode::Simple => {
                SimpleSkillExecutor::new(Arc::clone(&self.engine), self.config.pricing)
                    .with_retry_policy(self.retry)
                    .execute(run, events)
                    .await
            }
            ExecutionMode::Autonomous => {
                let invoker = Arc::new(NestedInvoker {
                    orchestrator: Arc::clone(self),
                });
                AutonomousSkillExecutor::new(Arc::clone(&self.engine), Arc::clone(&job.tools))
                    .with_invoker(invoker)
                    .with_pricing(self.config.pricing)
                    .with_retry_policy(self.retry)
                    .execute(run, events)
                    .await
            }
        }
    }

    async fn record(&self, result: &ExecutionResult) {
        if let Some(sink) = &self.sink {
            sink.record(result).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Nested execution
// ---------------------------------------------------------------------------

/// Runs delegated skills through the orchestrator that owns the parent.
struct NestedInvoker {
    orchestrator: Arc<SkillOrchestrator>,
}

#[async_trait]
impl SkillInvoker for NestedInvoker {
    async fn invoke_skill(
        &self,
        skill_name: &str,
        request: &str,
        parent: &ExecutionContext,
        tools: Arc<ToolExecutor>,
    ) -> Result<String> {
        if !parent.can_fork() {
            return Err(AgentError::RecursionLimit {
                depth: parent.depth,
                max_depth: parent.max_depth,
            });
        }
        let request = ExecutionRequest::new(skill_name, request)
            .with_parent(parent.clone())
            .with_tool_executor(tools);

        // The child runs inside this future rather than in its own task, so
        // a parent timeout or cancellation unwinds the child's stack entry
        // before the parent continues.
        let mut stream = match self.orchestrator.launch(request).await? {
            Launch::Finished(stream) => stream,
            Launch::Ready { job, events, stream } => {
                self.orchestrator.run_to_end(job, events).await;
                stream
            }
        };
        let mut answer = None;
        let mut failure = None;
        let mut final_state = None;

        while let Some(event) = stream.next().await {
            match event {
                TaskEvent::Message {
                    parts,
                    is_partial: false,
                } => answer = Some(text_of(&parts)),
                TaskEvent::Error { message, .. } => failure = Some(message),
                TaskEvent::Done { final_state: state } => final_state = Some(state),
                _ => {}
            }
        }

        match final_state {
            Some(TaskState::Completed) => Ok(answer.unwrap_or_default()),
            Some(state) => Err(AgentError::SkillFailed {
                name: skill_name.to_owned(),
                reason: failure.unwrap_or_else(|| format!("finished as {state:?}")),
            }),
            None => Err(AgentError::Internal(format!(
                "skill `{skill_name}` ended without a terminal event"
            ))),
        }
    }
}

fn text_of(parts: &[MessagePart]) -> String {
    parts
        .iter()
        .filter_map(|p| match p {
            MessagePart::Text { text } => Some(text.as_str()),
            MessagePart::Data { .. } => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Override, then skill metadata, then autonomous.
fn resolve_mode(mode_override: Option<ExecutionMode>, skill: &Skill) -> ExecutionMode {
    if let Some(mode) = mode_override {
        return mode;
    }
    match skill.metadata.execution_mode.as_deref() {
        None => ExecutionMode::Autonomous,
        Some(raw) => ExecutionMode::parse(raw).unwrap_or_else(|| {
            tracing::warn!(
                skill = %skill.name,
                value = %raw,
                "unrecognized execution_mode; using autonomous"
            );
            ExecutionMode::Autonomous
        }),
    }
}

fn resolve_context(context_override: Option<ContextMode>, skill: &Skill) -> ContextMode {
    if let Some(context) = context_override {
        return context;
    }
    match skill.metadata.context.as_deref() {
        None => ContextMode::Inherit,
        Some(raw) => ContextMode::parse(raw).unwrap_or_else(|| {
            tracing::warn!(
                skill = %skill.name,
                value = %raw,
                "unrecognized context mode; using inherit"
            );
            ContextMode::Inherit
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use omniforge_skills::SkillMetadata;

    fn skill_with(mode: Option<&str>, context: Option<&str>) -> Skill {
        Skill {
            name: "s".into(),
            description: String::new(),
            version: None,
            metadata: SkillMetadata {
                execution_mode: mode.map(str::to_owned),
                context: context.map(str::to_owned),
                ..SkillMetadata::default()
            },
            content: String::new(),
            skill_dir: PathBuf::from("/s"),
            scripts: Vec::new(),
        }
    }

    #[test]
    fn mode_resolution_order() {
        let simple = skill_with(Some("simple"), None);
        assert_eq!(resolve_mode(None, &simple), ExecutionMode::Simple);
        assert_eq!(
            resolve_mode(Some(ExecutionMode::Autonomous), &simple),
            ExecutionMode::Autonomous
        );
        assert_eq!(
            resolve_mode(None, &skill_with(None, None)),
            ExecutionMode::Autonomous
        );
        assert_eq!(
            resolve_mode(None, &skill_with(Some("hyperdrive"), None)),
            ExecutionMode::Autonomous
        );
    }

    #[test]
    fn context_resolution_order() {
        assert_eq!(
            resolve_context(None, &skill_with(None, Some("fork"))),
            ContextMode::Fork
        );
        assert_eq!(
            resolve_context(Some(ContextMode::Inherit), &skill_with(None, Some("fork"))),
            ContextMode::Inherit
        );
        assert_eq!(
            resolve_context(None, &skill_with(None, Some("sideways"))),
            ContextMode::Inherit
        );
    }

    #[test]
    fn substitution_context_carries_request_fields() {
        let request = ExecutionRequest::new("s", "q3 report")
            .with_session_id("sess")
            .with_tenant_id("acme")
            .with_var("REGION", "emea");
        let vars = request.substitution_context(&skill_with(None, None));
        assert_eq!(vars.arguments, "q3 report");
        assert_eq!(vars.session_id.as_deref(), Some("sess"));
        assert_eq!(vars.tenant_id.as_deref(), Some("acme"));
        assert_eq!(vars.skill_dir, Some(PathBuf::from("/s")));
        assert_eq!(vars.custom["REGION"], "emea");
    }

    #[test]
    fn text_of_skips_data_parts() {
        let parts = vec![
            MessagePart::text("a"),
            MessagePart::Data {
                data: serde_json::json!({}),
            },
            MessagePart::text("b"),
        ];
        assert_eq!(text_of(&parts), "a\nb");
    }
}
