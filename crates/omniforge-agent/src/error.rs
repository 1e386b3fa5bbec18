//! Agent error types.
//!
//! All engine subsystems surface errors through [`AgentError`].  Tool
//! restriction violations are deliberately *not* errors: they come back as
//! failed tool results so the reasoning engine can adapt.

use omniforge_sandbox::SandboxError;
use omniforge_skills::SkillError;

/// Unified error type for the skill execution engine.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    // -- Skill resolution ----------------------------------------------------
    /// The requested skill does not exist.
    #[error("skill not found: `{name}`")]
    SkillNotFound { name: String },

    /// Loading or preprocessing a skill failed.
    #[error("skill error: {0}")]
    Skill(#[from] SkillError),

    // -- Execution structure -------------------------------------------------
    /// A fork was requested with no remaining depth.
    #[error("recursion limit reached: depth {depth} of max {max_depth}")]
    RecursionLimit { depth: u32, max_depth: u32 },

    /// A skill was deactivated while not on top of the skill stack.
    #[error("skill stack order violated: cannot deactivate `{requested}` while top is {top:?}")]
    StackOrder {
        requested: String,
        top: Option<String>,
    },

    /// A delegated skill finished without completing.
    #[error("skill `{name}` did not complete: {reason}")]
    SkillFailed { name: String, reason: String },

    // -- Reasoning engine ----------------------------------------------------
    /// The request to the reasoning engine failed.
    #[error("reasoning request failed: {reason}")]
    ReasoningFailed { reason: String },

    /// The reasoning engine's response could not be parsed.
    #[error("reasoning response parse error: {reason}")]
    ReasoningParseFailed { reason: String },

    /// The API key is missing for a provider that requires one.
    #[error("missing api key for provider: {provider}")]
    MissingApiKey { provider: String },

    // -- Tools -----------------------------------------------------------------
    /// A tool invocation failed inside an adapter.
    #[error("tool execution failed for `{tool_name}`: {reason}")]
    ToolExecutionFailed { tool_name: String, reason: String },

    /// Script sandbox failure.
    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    // -- Configuration -------------------------------------------------------
    /// Configuration loading failed.
    #[error("config error: {reason}")]
    ConfigError { reason: String },

    // -- Serialization -------------------------------------------------------
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    // -- Generic -------------------------------------------------------------
    /// Catch-all for unexpected internal errors.
    #[error("internal agent error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Map a loader error, promoting "not found" to [`AgentError::SkillNotFound`].
    pub fn from_load(err: SkillError) -> Self {
        match err {
            SkillError::NotFound(name) => Self::SkillNotFound { name },
            other => Self::Skill(other),
        }
    }

    /// Short machine-readable code used in `error` task events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SkillNotFound { .. } => "skill_not_found",
            Self::Skill(_) => "skill_error",
            Self::RecursionLimit { .. } => "recursion_limit",
            Self::StackOrder { .. } => "stack_order",
            Self::SkillFailed { .. } => "skill_failed",
            Self::ReasoningFailed { .. } | Self::ReasoningParseFailed { .. } => "reasoning_failed",
            Self::MissingApiKey { .. } | Self::ConfigError { .. } => "config_error",
            Self::ToolExecutionFailed { .. } => "tool_failed",
            Self::Sandbox(e) if e.is_security() => "security_violation",
            Self::Sandbox(_) => "sandbox_error",
            Self::Json(_) | Self::Internal(_) => "internal_error",
        }
    }
}

/// Convenience alias used throughout the agent crate.
pub type Result<T> = std::result::Result<T, AgentError>;

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        Self::ReasoningFailed {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_promoted() {
        let err = AgentError::from_load(SkillError::NotFound("ghost".into()));
        assert!(matches!(err, AgentError::SkillNotFound { ref name } if name == "ghost"));
        assert_eq!(err.code(), "skill_not_found");
    }

    #[test]
    fn stack_order_display() {
        let err = AgentError::StackOrder {
            requested: "a".into(),
            top: Some("b".into()),
        };
        assert_eq!(
            err.to_string(),
            "skill stack order violated: cannot deactivate `a` while top is Some(\"b\")"
        );
    }

    #[test]
    fn security_sandbox_errors_have_distinct_code() {
        let err = AgentError::from(SandboxError::Security {
            violation_type: "path_traversal".into(),
            path: "x".into(),
        });
        assert_eq!(err.code(), "security_violation");
    }
}
