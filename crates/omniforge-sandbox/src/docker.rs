//! Docker isolation: one `docker run --rm` per script.
//!
//! The skill directory is mounted read-only at `/skill`; the workspace is
//! mounted at `/workspace`, writable only when writes are permitted.
//! Images are never pulled implicitly: a missing image is pulled once and
//! the run retried.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::process::Command;

use crate::config::ScriptExecutionConfig;
use crate::error::{Result, SandboxError};
use crate::executor::ScriptResult;
use crate::subprocess::{Invocation, RawOutput, Workspace, run_to_completion};

const CONTAINER_SKILL_DIR: &str = "/skill";
const CONTAINER_WORKSPACE: &str = "/workspace";

/// Limit for a one-off `docker pull`.
const PULL_TIMEOUT_MS: u64 = 300_000;

static CONTAINER_SEQ: AtomicU64 = AtomicU64::new(0);

fn container_name() -> String {
    format!(
        "omniforge-{}-{}",
        std::process::id(),
        CONTAINER_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

/// Build the `docker run` argument list.
pub(crate) fn docker_args(
    config: &ScriptExecutionConfig,
    inv: &Invocation<'_>,
    workspace: &Path,
    name: &str,
) -> Result<Vec<String>> {
    let rel = inv
        .script
        .strip_prefix(inv.skill_dir)
        .map_err(|_| SandboxError::Security {
            violation_type: "path_traversal".into(),
            path: inv.script.to_path_buf(),
        })?;
    let container_script = Path::new(CONTAINER_SKILL_DIR).join(rel);

    let mut args: Vec<String> = vec![
        "run".into(),
        "--rm".into(),
        "--pull=never".into(),
        "--name".into(),
        name.into(),
        "--security-opt".into(),
        "no-new-privileges".into(),
    ];
    if !config.allow_network {
        args.extend(["--network".into(), "none".into()]);
    }
    if config.memory_limit_mb > 0 {
        let mem = format!("{}m", config.memory_limit_mb);
        args.extend(["--memory".into(), mem.clone(), "--memory-swap".into(), mem]);
    }
    if config.docker_cpus > 0.0 {
        args.extend(["--cpus".into(), config.docker_cpus.to_string()]);
    }
    if config.cpu_time_limit_secs > 0 {
        let secs = config.cpu_time_limit_secs;
        args.extend(["--ulimit".into(), format!("cpu={secs}:{secs}")]);
    }

    args.extend([
        "-v".into(),
        format!("{}:{CONTAINER_SKILL_DIR}:ro", inv.skill_dir.display()),
        "-v".into(),
        format!(
            "{}:{CONTAINER_WORKSPACE}:{}",
            workspace.display(),
            if config.allow_write { "rw" } else { "ro" }
        ),
        "-w".into(),
        CONTAINER_WORKSPACE.into(),
    ]);

    let mut env: BTreeMap<&str, String> = inv
        .env
        .iter()
        .map(|(k, v)| (k.as_str(), v.clone()))
        .collect();
    env.insert("SKILL_DIR", CONTAINER_SKILL_DIR.into());
    env.insert("SKILL_ARGS", inv.args.join(" "));
    for (key, value) in env {
        args.extend(["-e".into(), format!("{key}={value}")]);
    }

    args.push(inv.language.docker_image().into());
    args.push(inv.language.command().into());
    args.extend(inv.language.args().iter().map(|a| (*a).to_owned()));
    args.push(container_script.display().to_string());
    args.extend(inv.args.iter().cloned());
    Ok(args)
}

pub(crate) async fn run_in_container(
    config: &ScriptExecutionConfig,
    inv: &Invocation<'_>,
) -> Result<ScriptResult> {
    let workspace = Workspace::prepare(config)?;
    let image = inv.language.docker_image();

    let first = docker_run(config, inv, workspace.path()).await?;
    if !is_missing_image(&first) {
        return Ok(first.into_result());
    }

    tracing::info!(image, "docker image missing locally, pulling once");
    let mut pull = Command::new("docker");
    pull.args(["pull", image]);
    let pulled = run_to_completion(&mut pull, PULL_TIMEOUT_MS)
        .await
        .map_err(docker_unavailable)?;
    if !pulled.status.success() {
        return Err(SandboxError::Unavailable {
            mode: "docker".into(),
            reason: format!(
                "failed to pull image `{image}`: {}",
                String::from_utf8_lossy(&pulled.stderr).trim()
            ),
        });
    }

    Ok(docker_run(config, inv, workspace.path())
        .await?
        .into_result())
}

async fn docker_run(
    config: &ScriptExecutionConfig,
    inv: &Invocation<'_>,
    workspace: &Path,
) -> Result<RawOutput> {
    let name = container_name();
    let mut cmd = Command::new("docker");
    cmd.args(docker_args(config, inv, workspace, &name)?);

    match run_to_completion(&mut cmd, config.timeout_ms).await {
        Ok(raw) => Ok(raw),
        Err(SandboxError::Timeout { limit_ms }) => {
            // Killing the client does not stop the container.
            let _ = Command::new("docker")
                .args(["rm", "-f", &name])
                .kill_on_drop(true)
                .output()
                .await;
            Err(SandboxError::Timeout { limit_ms })
        }
        Err(e) => Err(docker_unavailable(e)),
    }
}

fn docker_unavailable(err: SandboxError) -> SandboxError {
    match err {
        SandboxError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
            SandboxError::Unavailable {
                mode: "docker".into(),
                reason: "docker binary not found on PATH".into(),
            }
        }
        other => other,
    }
}

fn is_missing_image(raw: &RawOutput) -> bool {
    !raw.status.success() && String::from_utf8_lossy(&raw.stderr).contains("No such image")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
