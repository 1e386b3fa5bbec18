//! Tool dispatch behind a LIFO skill stack.
//!
//! [`ToolExecutor`] owns the registered [`ToolAdapter`]s and the stack of
//! active skills.  Every call is checked against the restriction of the
//! skill on top of the stack before it is dispatched; violations come back
//! as failed [`ToolResult`]s, never as errors.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use omniforge_sandbox::{SandboxError, ScriptExecutor};
use omniforge_skills::{SCRIPTS_DIR, Skill};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::context::ExecutionContext;
use crate::error::{AgentError, Result};
use crate::llm::ToolDefinition;

/// Built-in tool: load a catalogued supporting file.
pub const LOAD_FILE_TOOL: &str = "load_file";
/// Built-in tool: run one of the active skill's hook scripts.
pub const RUN_SCRIPT_TOOL: &str = "run_script";
/// Built-in tool: delegate to another skill.
pub const SKILL_TOOL: &str = "skill";

/// Tools that read files and are therefore subject to the hook-script guard.
const READ_TOOLS: &[&str] = &[
    "read",
    "read_file",
    "view",
    "cat",
    "fs_read_file",
    LOAD_FILE_TOOL,
];

/// Argument keys that may carry a read target.
const PATH_KEYS: &[&str] = &["path", "file_path", "file", "name"];

/// Adapter output beyond this is cut before it reaches the transcript.
const MAX_OUTPUT_BYTES: usize = 100 * 1024;

// ---------------------------------------------------------------------------
// Adapter trait
// ---------------------------------------------------------------------------

/// A source of tools the reasoning engine can call.
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    /// The unique identifier for this adapter.
    fn adapter_id(&self) -> &str;

    /// Returns the tool definitions this adapter exposes.
    fn tool_definitions(&self) -> Vec<ToolDefinition>;

    /// Execute a named tool.  The returned string becomes the observation.
    async fn execute(&self, tool_name: &str, arguments: Value) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    /// `false` for policy denials; retrying the same call cannot succeed.
    pub retryable: bool,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            retryable: false,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            retryable: true,
        }
    }

    /// A failure that must not be retried.
    pub fn denied(error: impl Into<String>) -> Self {
        Self {
            retryable: false,
            ..Self::failure(error)
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    /// Text fed back to the reasoning engine.
    pub fn observation(&self) -> String {
        match (&self.error, self.output.is_empty()) {
            (None, _) => self.output.clone(),
            (Some(err), true) => format!("Error: {err}"),
            (Some(err), false) => format!("Error: {err}\n{}", self.output),
        }
    }
}

// ---------------------------------------------------------------------------
// Skill stack
// ---------------------------------------------------------------------------

/// Snapshot of an active skill's permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillStackEntry {
    pub skill_name: String,
    /// `None` means unrestricted.
    pub allowed_tools: Option<Vec<String>>,
    pub skill_dir: PathBuf,
    /// Hook script file names.
    pub scripts: Vec<String>,
}

impl SkillStackEntry {
    pub fn from_skill(skill: &Skill) -> Self {
        Self {
            skill_name: skill.name.clone(),
            allowed_tools: skill.allowed_tools().map(<[String]>::to_vec),
            skill_dir: skill.skill_dir.clone(),
            scripts: skill.scripts.iter().map(|s| s.filename.clone()).collect(),
        }
    }

    pub fn has_scripts(&self) -> bool {
        !self.scripts.is_empty()
    }

    pub fn allows(&self, tool_name: &str) -> bool {
        self.allowed_tools
            .as_ref()
            .is_none_or(|allowed| allowed.iter().any(|t| t == tool_name))
    }
}

/// Activation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolExecutorStats {
    pub activations: u64,
    pub deactivations: u64,
    pub depth: usize,
}

// ---------------------------------------------------------------------------
// ToolExecutor
// ---------------------------------------------------------------------------

/// Dispatches tool calls under the restriction of the top active skill.
pub struct ToolExecutor {
    adapters: Vec<Arc<dyn ToolAdapter>>,
    scripts: Arc<ScriptExecutor>,
    stack: Mutex<Vec<SkillStackEntry>>,
    activations: AtomicU64,
    deactivations: AtomicU64,
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor")
            .field("adapters", &self.adapters.len())
            .field("stack", &self.stack_names())
            .finish()
    }
}

impl ToolExecutor {
    pub fn new(adapters: Vec<Arc<dyn ToolAdapter>>, scripts: Arc<ScriptExecutor>) -> Self {
        Self {
            adapters,
            scripts,
            stack: Mutex::new(Vec::new()),
            activations: AtomicU64::new(0),
            deactivations: AtomicU64::new(0),
        }
    }

    fn lock_stack(&self) -> MutexGuard<'_, Vec<SkillStackEntry>> {
        self.stack.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -- Stack ---------------------------------------------------------------

    /// Push `skill` onto the stack.  Returns the new depth.
    pub fn activate_skill(&self, skill: &Skill) -> usize {
        let mut stack = self.lock_stack();
        stack.push(SkillStackEntry::from_skill(skill));
        self.activations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            skill = %skill.name,
            depth = stack.len(),
            restricted = skill.allowed_tools().is_some(),
            "skill activated"
        );
        stack.len()
    }

    /// Pop `skill_name`, which must be on top.  The stack is left untouched
    /// on error.
    pub fn deactivate_skill(&self, skill_name: &str) -> Result<()> {
        let mut stack = self.lock_stack();
        let top = stack.last().map(|e| e.skill_name.clone());
        if top.as_deref() != Some(skill_name) {
            return Err(AgentError::StackOrder {
                requested: skill_name.to_owned(),
                top,
            });
        }
        stack.pop();
        self.deactivations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(skill = %skill_name, depth = stack.len(), "skill deactivated");
        Ok(())
    }

    /// Activate `skill` for the lifetime of the returned guard.
    pub fn activate_scoped(self: &Arc<Self>, skill: &Skill) -> ActiveSkillGuard {
        self.activate_skill(skill);
        ActiveSkillGuard {
            executor: Arc::clone(self),
            skill_name: skill.name.clone(),
        }
    }

    pub fn depth(&self) -> usize {
        self.lock_stack().len()
    }

    /// The entry whose restriction currently applies.
    pub fn active_skill(&self) -> Option<SkillStackEntry> {
        self.lock_stack().last().cloned()
    }

    pub fn stack_names(&self) -> Vec<String> {
        self.lock_stack()
            .iter()
            .map(|e| e.skill_name.clone())
            .collect()
    }

    pub fn stats(&self) -> ToolExecutorStats {
        ToolExecutorStats {
            activations: self.activations.load(Ordering::Relaxed),
            deactivations: self.deactivations.load(Ordering::Relaxed),
            depth: self.depth(),
        }
    }

    // -- Catalogue -----------------------------------------------------------

    /// Definitions visible to the active skill: adapter tools, `run_script`
    /// when the skill has hook scripts, and `extra` built-ins, filtered by
    /// the allow-list.
    pub fn tool_definitions(&self, extra: Vec<ToolDefinition>) -> Vec<ToolDefinition> {
        let active = self.active_skill();
        let mut defs: Vec<ToolDefinition> = self
            .adapters
            .iter()
            .flat_map(|a| a.tool_definitions())
            .collect();
        if let Some(entry) = active.as_ref().filter(|e| e.has_scripts()) {
            defs.push(run_script_definition(&entry.scripts));
        }
        defs.extend(extra);

        match active {
            Some(entry) => defs.into_iter().filter(|d| entry.allows(&d.name)).collect(),
            None => defs,
        }
    }

    // -- Authorization -------------------------------------------------------

    /// Check `tool_name` against the current stack.  Returns the denial as a
    /// failed [`ToolResult`].
    pub fn authorize(
        &self,
        tool_name: &str,
        arguments: &Value,
    ) -> std::result::Result<(), ToolResult> {
        let stack = self.lock_stack();
        let Some(top) = stack.last() else {
            return Ok(());
        };

        if !top.allows(tool_name) {
            let allowed = top
                .allowed_tools
                .as_deref()
                .filter(|a| !a.is_empty())
                .map(|a| a.join(", "))
                .unwrap_or_else(|| "(none)".to_owned());
            tracing::info!(
                skill = %top.skill_name,
                tool = %tool_name,
                allowed = %allowed,
                "tool call denied by skill restriction"
            );
            return Err(ToolResult::denied(format!(
                "Tool '{tool_name}' is not allowed for skill '{}'. Allowed tools: {allowed}",
                top.skill_name
            )));
        }

        if READ_TOOLS.contains(&tool_name)
            && let Some(target) = read_target(arguments)
            && let Some(owner) = stack
                .iter()
                .rev()
                .filter(|e| e.has_scripts())
                .find(|e| targets_scripts_dir(e, target))
        {
            tracing::warn!(
                target: "omniforge::audit",
                violation_type = "script_introspection",
                skill = %owner.skill_name,
                tool = %tool_name,
                path = %target,
                "blocked read of hook scripts"
            );
            return Err(ToolResult::denied(format!(
                "Reading hook scripts of skill '{}' is not permitted; run them with `{RUN_SCRIPT_TOOL}` instead",
                owner.skill_name
            )));
        }

        Ok(())
    }

    // -- Dispatch ------------------------------------------------------------

    /// Authorize and run one tool call.
    pub async fn execute(
        &self,
        tool_name: &str,
        arguments: Value,
        ctx: &ExecutionContext,
    ) -> ToolResult {
        if let Err(denied) = self.authorize(tool_name, &arguments) {
            return denied;
        }

        tracing::debug!(
            task_id = %ctx.task_id,
            chain = ?ctx.skill_chain,
            tool = %tool_name,
            "dispatching tool call"
        );

        if tool_name == RUN_SCRIPT_TOOL {
            return self.run_script(&arguments).await;
        }

        let Some(adapter) = self
            .adapters
            .iter()
            .find(|a| a.tool_definitions().iter().any(|d| d.name == tool_name))
        else {
            return ToolResult::denied(format!("Unknown tool: {tool_name}"));
        };

        match adapter.execute(tool_name, arguments).await {
            Ok(output) => ToolResult::ok(truncate_output(output)),
            Err(e) => {
                tracing::warn!(
                    adapter = adapter.adapter_id(),
                    tool = %tool_name,
                    error = %e,
                    "tool execution failed"
                );
                ToolResult::failure(e.to_string())
            }
        }
    }

    async fn run_script(&self, arguments: &Value) -> ToolResult {
        let Some(entry) = self.active_skill().filter(SkillStackEntry::has_scripts) else {
            return ToolResult::denied("The active skill has no hook scripts");
        };
        let Some(script) = arguments["script"].as_str().filter(|s| !s.is_empty()) else {
            return ToolResult::failure("Missing required argument: script");
        };

        let args: Vec<String> = arguments["args"]
            .as_array()
            .map(|a| {
                a.iter()
                    .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_owned))
                    .collect()
            })
            .unwrap_or_default();
        let env: HashMap<String, String> = arguments["env"]
            .as_object()
            .map(|o| {
                o.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_owned())))
                    .collect()
            })
            .unwrap_or_default();

        let path = script_path(script);
        match self
            .scripts
            .execute(&path, &entry.skill_dir, &args, &env)
            .await
        {
            Ok(result) if result.success => ToolResult::ok(result.output),
            Ok(result) => {
                let status = result
                    .exit_code
                    .map_or_else(|| "terminated by signal".to_owned(), |c| format!("exit code {c}"));
                ToolResult::failure(format!("Script {script} failed ({status})"))
                    .with_output(result.output)
            }
            Err(e @ SandboxError::Security { .. }) => ToolResult::denied(e.to_string()),
            Err(e @ SandboxError::Unavailable { .. }) => ToolResult::denied(e.to_string()),
            Err(e) => ToolResult::failure(e.to_string()),
        }
    }
}

/// Releases its skill from the stack when dropped.
#[derive(Debug)]
pub struct ActiveSkillGuard {
    executor: Arc<ToolExecutor>,
    skill_name: String,
}

impl ActiveSkillGuard {
    pub fn skill_name(&self) -> &str {
        &self.skill_name
    }
}

impl Drop for ActiveSkillGuard {
    fn drop(&mut self) {
        if let Err(e) = self.executor.deactivate_skill(&self.skill_name) {
            tracing::error!(skill = %self.skill_name, error = %e, "failed to release skill");
        }
    }
}

// ---------------------------------------------------------------------------
// Built-in definitions
// ---------------------------------------------------------------------------

pub fn load_file_definition() -> ToolDefinition {
    ToolDefinition {
        name: LOAD_FILE_TOOL.into(),
        description: "Load one of the skill's supporting files listed under \
                      'Available supporting files'."
            .into(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "File name as listed in the catalogue"}
            },
            "required": ["name"]
        }),
    }
}

pub fn run_script_definition(scripts: &[String]) -> ToolDefinition {
    ToolDefinition {
        name: RUN_SCRIPT_TOOL.into(),
        description: format!(
            "Run one of the skill's hook scripts in a sandbox. Available: {}",
            scripts.join(", ")
        ),
        input_schema: json!({
            "type": "object",
            "properties": {
                "script": {"type": "string", "enum": scripts},
                "args": {"type": "array", "items": {"type": "string"}},
                "env": {"type": "object", "additionalProperties": {"type": "string"}}
            },
            "required": ["script"]
        }),
    }
}

pub fn skill_definition() -> ToolDefinition {
    ToolDefinition {
        name: SKILL_TOOL.into(),
        description: "Delegate a sub-task to another skill and return its final answer.".into(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "skill": {"type": "string", "description": "Skill name"},
                "request": {"type": "string", "description": "What the skill should do"}
            },
            "required": ["skill", "request"]
        }),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_target(arguments: &Value) -> Option<&str> {
    PATH_KEYS
        .iter()
        .find_map(|k| arguments.get(*k).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

fn targets_scripts_dir(entry: &SkillStackEntry, target: &str) -> bool {
    let scripts_dir = entry.skill_dir.join(SCRIPTS_DIR);
    let raw = Path::new(target);
    let candidate = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        entry.skill_dir.join(raw)
    };

    if normalize(&candidate).starts_with(&scripts_dir) {
        return true;
    }
    match (candidate.canonicalize(), scripts_dir.canonicalize()) {
        (Ok(c), Ok(s)) => c.starts_with(s),
        _ => false,
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Bare file names refer to `scripts/<name>`.
fn script_path(script: &str) -> PathBuf {
    let path = Path::new(script);
    if path.is_absolute() || path.starts_with(SCRIPTS_DIR) {
        path.to_path_buf()
    } else {
        Path::new(SCRIPTS_DIR).join(path)
    }
}

fn truncate_output(mut output: String) -> String {
    if output.len() <= MAX_OUTPUT_BYTES {
        return output;
    }
    let mut cut = MAX_OUTPUT_BYTES;
    while !output.is_char_boundary(cut) {
        cut -= 1;
    }
    output.truncate(cut);
    output.push_str("\n... [output truncated at 100 KB]");
    output
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use omniforge_skills::{SkillMetadata, SkillScript};

    struct EchoAdapter;

    #[async_trait]
    impl ToolAdapter for EchoAdapter {
        fn adapter_id(&self) -> &str {
            "echo"
        }

        fn tool_definitions(&self) -> Vec<ToolDefinition> {
            ["read", "write", "grep"]
                .iter()
                .map(|name| ToolDefinition {
                    name: (*name).into(),
                    description: String::new(),
                    input_schema: json!({"type": "object"}),
                })
                .collect()
        }

        async fn execute(&self, tool_name: &str, arguments: Value) -> Result<String> {
            if arguments["fail"].as_bool() == Some(true) {
                return Err(AgentError::ToolExecutionFailed {
                    tool_name: tool_name.into(),
                    reason: "asked to fail".into(),
                });
            }
            Ok(format!("{tool_name} ok"))
        }
    }

    fn skill(name: &str, allowed: Option<&[&str]>, dir: &Path, scripts: &[&str]) -> Skill {
        Skill {
            name: name.into(),
            description: String::new(),
            version: None,
            metadata: SkillMetadata {
                allowed_tools: allowed.map(|a| a.iter().map(|s| (*s).to_owned()).collect()),
                ..SkillMetadata::default()
            },
            content: String::new(),
            skill_dir: dir.to_path_buf(),
            scripts: scripts
                .iter()
                .map(|f| SkillScript {
                    filename: (*f).into(),
                    path: dir.join("scripts").join(f),
                })
                .collect(),
        }
    }

    fn executor() -> Arc<ToolExecutor> {
        Arc::new(ToolExecutor::new(
            vec![Arc::new(EchoAdapter)],
            Arc::new(ScriptExecutor::default()),
        ))
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::root("t", 3)
    }

    #[tokio::test]
    async fn disallowed_tool_fails_naming_allowed_set() {
        let tools = executor();
        tools.activate_skill(&skill("a", Some(&["read", "grep"]), Path::new("/s/a"), &[]));

        let denied = tools.execute("write", json!({}), &ctx()).await;
        assert!(!denied.success);
        assert!(!denied.retryable);
        assert_eq!(
            denied.error.as_deref(),
            Some("Tool 'write' is not allowed for skill 'a'. Allowed tools: read, grep")
        );

        let failed = tools.execute("grep", json!({"fail": true}), &ctx()).await;
        assert!(!failed.success);
        assert!(failed.retryable);

        let again = tools.execute("write", json!({}), &ctx()).await;
        assert_eq!(again, denied);

        assert!(tools.execute("read", json!({"path": "x"}), &ctx()).await.success);
    }

    #[test]
    fn deactivate_requires_top() {
        let tools = executor();
        tools.activate_skill(&skill("a", None, Path::new("/s/a"), &[]));
        tools.activate_skill(&skill("b", None, Path::new("/s/b"), &[]));

        let err = tools.deactivate_skill("a").unwrap_err();
        assert!(matches!(err, AgentError::StackOrder { ref top, .. } if top.as_deref() == Some("b")));
        assert_eq!(tools.depth(), 2);

        tools.deactivate_skill("b").unwrap();
        tools.deactivate_skill("a").unwrap();
        assert_eq!(tools.depth(), 0);
        assert!(tools.deactivate_skill("a").is_err());
        assert_eq!(
            tools.stats(),
            ToolExecutorStats {
                activations: 2,
                deactivations: 2,
                depth: 0
            }
        );
    }

    #[tokio::test]
    async fn restriction_follows_top_of_stack() {
        let tools = executor();
        tools.activate_skill(&skill("a", Some(&["read"]), Path::new("/s/a"), &[]));
        tools.activate_skill(&skill("b", None, Path::new("/s/b"), &[]));
        assert!(tools.execute("write", json!({}), &ctx()).await.success);

        tools.deactivate_skill("b").unwrap();
        assert!(!tools.execute("write", json!({}), &ctx()).await.success);
    }

    #[test]
    fn guard_releases_on_drop() {
        let tools = executor();
        {
            let guard = tools.activate_scoped(&skill("a", None, Path::new("/s/a"), &[]));
            assert_eq!(guard.skill_name(), "a");
            assert_eq!(tools.depth(), 1);
        }
        assert_eq!(tools.depth(), 0);
        assert_eq!(tools.stats().deactivations, 1);
    }

    #[test]
    fn guard_releases_on_panic() {
        let tools = executor();
        let inner = Arc::clone(&tools);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = inner.activate_scoped(&skill("a", None, Path::new("/s/a"), &[]));
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(tools.depth(), 0);
    }

    #[test]
    fn read_of_own_scripts_is_blocked() {
        let tools = executor();
        let dir = Path::new("/s/report");
        tools.activate_skill(&skill("report", None, dir, &["run.sh"]));

        for args in [
            json!({"path": "scripts/run.sh"}),
            json!({"file_path": "/s/report/scripts/run.sh"}),
            json!({"file": "docs/../scripts/run.sh"}),
        ] {
            let denied = tools.authorize("read_file", &args).unwrap_err();
            assert!(denied.error.unwrap().contains("report"), "{args}");
        }
        assert!(tools.authorize("read", &json!({"path": "README.md"})).is_ok());
        assert!(tools.authorize("write", &json!({"path": "scripts/run.sh"})).is_ok());
    }

    #[test]
    fn skill_without_scripts_is_not_guarded() {
        let tools = executor();
        tools.activate_skill(&skill("plain", None, Path::new("/s/plain"), &[]));
        assert!(tools.authorize("cat", &json!({"path": "scripts/x.sh"})).is_ok());
    }

    #[test]
    fn catalogue_is_filtered_by_allow_list() {
        let tools = executor();
        assert_eq!(tools.tool_definitions(Vec::new()).len(), 3);

        tools.activate_skill(&skill(
            "a",
            Some(&["grep", RUN_SCRIPT_TOOL]),
            Path::new("/s/a"),
            &["go.sh"],
        ));
        let names: Vec<_> = tools
            .tool_definitions(vec![load_file_definition()])
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["grep", RUN_SCRIPT_TOOL]);
    }

    #[tokio::test]
    async fn unknown_tool_is_a_failed_result() {
        let tools = executor();
        let result = tools.execute("teleport", json!({}), &ctx()).await;
        assert_eq!(result.error.as_deref(), Some("Unknown tool: teleport"));
    }

    #[tokio::test]
    async fn run_script_traversal_is_denied() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("scripts")).unwrap();
        std::fs::write(tmp.path().join("scripts/ok.sh"), "echo ok").unwrap();
        let tools = executor();
        tools.activate_skill(&skill("s", None, tmp.path(), &["ok.sh"]));

        let result = tools
            .execute(
                RUN_SCRIPT_TOOL,
                json!({"script": "scripts/../../etc/passwd"}),
                &ctx(),
            )
            .await;
        assert!(!result.success);
        assert!(!result.retryable);
        assert!(result.error.unwrap().contains("path_traversal"));
    }

    #[test]
    fn script_path_defaults_to_scripts_dir() {
        assert_eq!(script_path("run.sh"), PathBuf::from("scripts/run.sh"));
        assert_eq!(script_path("scripts/run.sh"), PathBuf::from("scripts/run.sh"));
    }

    #[test]
    fn observation_formats() {
        assert_eq!(ToolResult::ok("fine").observation(), "fine");
        assert_eq!(ToolResult::failure("bad").observation(), "Error: bad");
        assert_eq!(
            ToolResult::failure("bad").with_output("trace").observation(),
            "Error: bad\ntrace"
        );
    }

    #[test]
    fn truncate_output_long_input() {
        let out = truncate_output("é".repeat(MAX_OUTPUT_BYTES));
        assert!(out.ends_with("[output truncated at 100 KB]"));
        assert!(out.len() < MAX_OUTPUT_BYTES + 64);
    }
}
