//! [`ScriptExecutor`]: the single entry point for running hook scripts.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{SandboxMode, ScriptExecutionConfig};
use crate::error::{Result, SandboxError};
use crate::language::ScriptLanguage;
use crate::path_policy::validate_script_path;
use crate::subprocess::{Invocation, run_sandboxed, run_unsandboxed};

/// Outcome of a script run that reached the process stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptResult {
    pub success: bool,
    /// Stdout, followed by stderr under a `[stderr]` header when present.
    pub output: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

/// Runs hook scripts under the configured isolation mode.
#[derive(Debug, Clone, Default)]
pub struct ScriptExecutor {
    config: ScriptExecutionConfig,
}

impl ScriptExecutor {
    pub fn new(config: ScriptExecutionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScriptExecutionConfig {
        &self.config
    }

    /// Validate and run `script` (absolute, or relative to `skill_dir`).
    ///
    /// Path violations fail with [`SandboxError::Security`] before anything
    /// is spawned.  A script that runs and exits non-zero is an `Ok` result
    /// with `success == false`.
    pub async fn execute(
        &self,
        script: &Path,
        skill_dir: &Path,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<ScriptResult> {
        let canonical = validate_script_path(script, skill_dir)?;
        let skill_dir = skill_dir.canonicalize()?;
        let language = ScriptLanguage::from_path(&canonical).ok_or_else(|| {
            SandboxError::UnsupportedLanguage {
                path: canonical.clone(),
            }
        })?;

        let inv = Invocation {
            script: &canonical,
            skill_dir: &skill_dir,
            language,
            args,
            env,
        };

        tracing::info!(
            script = %canonical.display(),
            mode = %self.config.mode,
            interpreter = language.command(),
            "skill_script_started"
        );

        let result = match self.config.mode {
            SandboxMode::None => {
                tracing::warn!(
                    script = %canonical.display(),
                    "running script without sandbox; development use only"
                );
                run_unsandboxed(&self.config, &inv).await
            }
            SandboxMode::Subprocess => run_sandboxed(&self.config, &inv).await,
            SandboxMode::Docker => crate::docker::run_in_container(&self.config, &inv).await,
        };

        match &result {
            Ok(r) => tracing::info!(
                script = %canonical.display(),
                success = r.success,
                exit_code = ?r.exit_code,
                duration_ms = r.duration_ms,
                "skill_script_finished"
            ),
            Err(e) => tracing::warn!(
                script = %canonical.display(),
                error = %e,
                "skill_script_failed"
            ),
        }
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn traversal_fails_before_spawn() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("scripts")).unwrap();
        let executor = ScriptExecutor::default();
        let err = executor
            .execute(
                Path::new("scripts/../../etc/passwd"),
                tmp.path(),
                &[],
                &HashMap::new(),
            )
            .await
            .unwrap_err();
        assert!(err.is_security());
    }

    #[tokio::test]
    async fn unknown_extension_is_unsupported() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("scripts")).unwrap();
        std::fs::write(tmp.path().join("scripts/tool.bin"), [0u8]).unwrap();
        let err = ScriptExecutor::default()
            .execute(Path::new("scripts/tool.bin"), tmp.path(), &[], &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::UnsupportedLanguage { .. }));
    }
}
