//! Variable substitution, the last preprocessing stage.
//!
//! Recognised placeholders:
//!
//! | placeholder | value |
//! |---|---|
//! | `$ARGUMENTS`, `${ARGUMENTS}` | the raw argument string |
//! | `$ARGUMENTS[N]` | the N-th whitespace-separated argument |
//! | `${SESSION_ID}`, `${TENANT_ID}` | execution identifiers |
//! | `${SKILL_DIR}`, `${WORKSPACE}` | directories |
//! | `${USER}` | caller, falling back to `$USER` |
//! | `${DATE}` | today, `YYYY-MM-DD` |
//! | `${NAME}` | custom variables |
//!
//! Unresolved placeholders stay in the text and are reported in
//! [`SubstitutedContent::undefined_vars`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$ARGUMENTS\[(\d+)\]|\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$ARGUMENTS\b")
        .expect("valid regex")
});

/// Values available to the substitutor.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionContext {
    pub arguments: String,
    pub session_id: Option<String>,
    pub tenant_id: Option<String>,
    pub skill_dir: Option<PathBuf>,
    pub workspace: Option<PathBuf>,
    pub user: Option<String>,
    /// Fixed date, mostly for tests.  Defaults to the local date.
    pub date: Option<String>,
    pub custom: HashMap<String, String>,
}

impl SubstitutionContext {
    pub fn new(arguments: impl Into<String>) -> Self {
        Self {
            arguments: arguments.into(),
            ..Self::default()
        }
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_tenant_id(mut self, id: impl Into<String>) -> Self {
        self.tenant_id = Some(id.into());
        self
    }

    pub fn with_skill_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.skill_dir = Some(dir.into());
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

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.insert(name.into(), value.into());
        self
    }

    fn builtin(&self, name: &str) -> Option<String> {
        match name {
            "ARGUMENTS" => Some(self.arguments.clone()),
            "SESSION_ID" => self.session_id.clone(),
            "TENANT_ID" => self.tenant_id.clone(),
            "SKILL_DIR" => self.skill_dir.as_ref().map(|p| p.display().to_string()),
            "WORKSPACE" => self.workspace.as_ref().map(|p| p.display().to_string()),
            "USER" => self.user.clone().or_else(|| std::env::var("USER").ok()),
            "DATE" => Some(
                self.date
                    .clone()
                    .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string()),
            ),
            _ => None,
        }
    }

    fn resolve(&self, name: &str) -> Option<String> {
        self.builtin(name).or_else(|| self.custom.get(name).cloned())
    }
}

/// Result of substitution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstitutedContent {
    pub content: String,
    pub substitutions_made: usize,
    /// Placeholder names that had no value, in order of first appearance.
    pub undefined_vars: Vec<String>,
}

/// Replaces placeholders in preprocessed skill content.
#[derive(Debug, Clone, Default)]
pub struct StringSubstitutor;

impl StringSubstitutor {
    pub fn new() -> Self {
        Self
    }

    pub fn substitute(&self, content: &str, ctx: &SubstitutionContext) -> SubstitutedContent {
        let positional: Vec<&str> = ctx.arguments.split_whitespace().collect();
        let mut substitutions_made = 0;
        let mut undefined_vars: Vec<String> = Vec::new();
        let mut consumed_arguments = false;

        let replaced = PLACEHOLDER_RE.replace_all(content, |caps: &Captures<'_>| {
            let whole = caps.get(0).map_or("", |m| m.as_str()).to_owned();

            let (name, value) = if let Some(index) = caps.get(1) {
                consumed_arguments = true;
                let value = index
                    .as_str()
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| positional.get(i))
                    .map(|s| (*s).to_owned());
                (format!("ARGUMENTS[{}]", index.as_str()), value)
            } else if let Some(var) = caps.get(2) {
                if var.as_str() == "ARGUMENTS" {
                    consumed_arguments = true;
                }
                (var.as_str().to_owned(), ctx.resolve(var.as_str()))
            } else {
                consumed_arguments = true;
                ("ARGUMENTS".to_owned(), Some(ctx.arguments.clone()))
            };

            match value {
                Some(v) => {
                    substitutions_made += 1;
                    v
                }
                None => {
                    if !undefined_vars.contains(&name) {
                        undefined_vars.push(name);
                    }
                    whole
                }
            }
        });

        let mut content = replaced.into_owned();
        if !consumed_arguments && !ctx.arguments.trim().is_empty() {
            content.push_str("\n\nARGUMENTS: ");
            content.push_str(&ctx.arguments);
        }

        if !undefined_vars.is_empty() {
            tracing::debug!(undefined = ?undefined_vars, "unresolved placeholders left in content");
        }

        SubstitutedContent {
            content,
            substitutions_made,
            undefined_vars,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
