//! Subprocess execution for the `none` and `subprocess` modes, plus the
//! process plumbing shared with the Docker runner.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::process::Command;

use crate::config::ScriptExecutionConfig;
use crate::error::{Result, SandboxError};
use crate::executor::ScriptResult;
use crate::language::ScriptLanguage;

/// Maximum bytes of stdout (and, separately, stderr) kept from a run.
const MAX_OUTPUT_BYTES: usize = 100 * 1024;

/// Everything needed to launch one validated script.
#[derive(Debug)]
pub(crate) struct Invocation<'a> {
    /// Canonical script path, already validated.
    pub script: &'a Path,
    /// Canonical skill directory.
    pub skill_dir: &'a Path,
    pub language: ScriptLanguage,
    pub args: &'a [String],
    pub env: &'a HashMap<String, String>,
}

/// Working directory for a run: configured, or a temp dir removed on drop.
pub(crate) enum Workspace {
    Configured(PathBuf),
    Temporary(tempfile::TempDir),
}

impl Workspace {
    pub(crate) fn prepare(config: &ScriptExecutionConfig) -> Result<Self> {
        match &config.workspace_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Ok(Self::Configured(dir.clone()))
            }
            None => Ok(Self::Temporary(
                tempfile::Builder::new().prefix("omniforge-ws-").tempdir()?,
            )),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        match self {
            Self::Configured(p) => p,
            Self::Temporary(t) => t.path(),
        }
    }
}

/// Raw result of a finished process.
pub(crate) struct RawOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration_ms: u64,
}

impl RawOutput {
    pub(crate) fn into_result(self) -> ScriptResult {
        let (mut output, _) = truncate_output(&self.stdout);
        let stderr = truncate_output(&self.stderr).0;
        if !stderr.trim().is_empty() {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str("[stderr]\n");
            output.push_str(&stderr);
        }
        ScriptResult {
            success: self.status.success(),
            output,
            exit_code: self.status.code(),
            duration_ms: self.duration_ms,
        }
    }
}

/// Run a prepared command to completion under a wall-clock limit.  The
/// child is killed when the limit elapses.
pub(crate) async fn run_to_completion(cmd: &mut Command, timeout_ms: u64) -> Result<RawOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let output = tokio::time::timeout(Duration::from_millis(timeout_ms), cmd.output())
        .await
        .map_err(|_| SandboxError::Timeout {
            limit_ms: timeout_ms,
        })??;

    Ok(RawOutput {
        status: output.status,
        stdout: output.stdout,
        stderr: output.stderr,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// `none` mode: host environment, skill directory as cwd, no limits other
/// than the timeout.
pub(crate) async fn run_unsandboxed(
    config: &ScriptExecutionConfig,
    inv: &Invocation<'_>,
) -> Result<ScriptResult> {
    let mut cmd = base_command(inv);
    cmd.current_dir(inv.skill_dir);
    set_script_env(&mut cmd, inv);
    Ok(run_to_completion(&mut cmd, config.timeout_ms)
        .await?
        .into_result())
}

/// `subprocess` mode: sanitized environment, isolated workspace as cwd,
/// rlimits applied before exec.
pub(crate) async fn run_sandboxed(
    config: &ScriptExecutionConfig,
    inv: &Invocation<'_>,
) -> Result<ScriptResult> {
    let workspace = Workspace::prepare(config)?;

    let mut cmd = base_command(inv);
    cmd.current_dir(workspace.path()).env_clear();
    for var in &config.env_allowlist {
        if let Ok(value) = std::env::var(var) {
            cmd.env(var, value);
        }
    }
    set_script_env(&mut cmd, inv);
    apply_resource_limits(&mut cmd, config);

    tracing::debug!(
        script = %inv.script.display(),
        workspace = %workspace.path().display(),
        memory_mb = config.memory_limit_mb,
        cpu_secs = config.cpu_time_limit_secs,
        "spawning sandboxed script"
    );

    let raw = run_to_completion(&mut cmd, config.timeout_ms).await?;
    drop(workspace);
    Ok(raw.into_result())
}

fn base_command(inv: &Invocation<'_>) -> Command {
    let mut cmd = Command::new(inv.language.command());
    cmd.args(inv.language.args()).arg(inv.script).args(inv.args);
    cmd
}

fn set_script_env(cmd: &mut Command, inv: &Invocation<'_>) {
    cmd.envs(inv.env)
        .env("SKILL_DIR", inv.skill_dir)
        .env("SKILL_ARGS", inv.args.join(" "));
}

#[cfg(unix)]
fn apply_resource_limits(cmd: &mut Command, config: &ScriptExecutionConfig) {
    let memory_bytes = config.memory_limit_mb.saturating_mul(1024 * 1024);
    let cpu_secs = config.cpu_time_limit_secs;
    let limit_memory = cfg!(target_os = "linux") && memory_bytes > 0;
    if !cfg!(target_os = "linux") && memory_bytes > 0 {
        tracing::warn!("address-space limit is only enforced on linux; skipping");
    }

    // SAFETY: the hook only calls setrlimit, which is async-signal-safe.
    unsafe {
        cmd.pre_exec(move || {
            if limit_memory {
                let limit = libc::rlimit {
                    rlim_cur: memory_bytes as libc::rlim_t,
                    rlim_max: memory_bytes as libc::rlim_t,
                };
                if libc::setrlimit(libc::RLIMIT_AS, &limit) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
            }
            if cpu_secs > 0 {
                let limit = libc::rlimit {
                    rlim_cur: cpu_secs as libc::rlim_t,
                    rlim_max: cpu_secs.saturating_add(1) as libc::rlim_t,
                };
                if libc::setrlimit(libc::RLIMIT_CPU, &limit) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn apply_resource_limits(_cmd: &mut Command, config: &ScriptExecutionConfig) {
    tracing::warn!(
        memory_mb = config.memory_limit_mb,
        cpu_secs = config.cpu_time_limit_secs,
        "resource limits are not supported on this platform; only the timeout applies"
    );
}

/// Truncate output to [`MAX_OUTPUT_BYTES`], returning whether it was cut.
fn truncate_output(raw: &[u8]) -> (String, bool) {
    if raw.len() <= MAX_OUTPUT_BYTES {
        (String::from_utf8_lossy(raw).into_owned(), false)
    } else {
        let mut s = String::from_utf8_lossy(&raw[..MAX_OUTPUT_BYTES]).into_owned();
        s.push_str("\n... [output truncated at 100 KB]");
        (s, true)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_output_short_input_not_truncated() {
        let (s, truncated) = truncate_output(b"hello");
        assert_eq!(s, "hello");
        assert!(!truncated);
    }

    #[test]
    fn truncate_output_large_input_is_truncated() {
        let data = vec![b'x'; MAX_OUTPUT_BYTES + 10];
        let (s, truncated) = truncate_output(&data);
        assert!(truncated);
        assert!(s.ends_with("[output truncated at 100 KB]"));
    }

    #[test]
    fn configured_workspace_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("ws/inner");
        let config = ScriptExecutionConfig::new().with_workspace_dir(&dir);
        let ws = Workspace::prepare(&config).unwrap();
        assert_eq!(ws.path(), dir.as_path());
        assert!(dir.is_dir());
    }

    #[test]
    fn temporary_workspace_is_removed_on_drop() {
        let ws = Workspace::prepare(&ScriptExecutionConfig::new()).unwrap();
        let path = ws.path().to_path_buf();
        assert!(path.is_dir());
        drop(ws);
        assert!(!path.exists());
    }
}
