//! Integration tests for the omniforge-sandbox crate.
//!
//! The subprocess tests spawn real `bash` processes and are unix-only.

use std::collections::HashMap;
use std::path::Path;

use omniforge_sandbox::{
    SandboxError, SandboxMode, ScriptExecutionConfig, ScriptExecutor, is_safe_path,
};

fn skill_with_script(name: &str, body: &str) -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir(tmp.path().join("scripts")).unwrap();
    std::fs::write(tmp.path().join("scripts").join(name), body).unwrap();
    tmp
}

// ═══════════════════════════════════════════════════════════════════════
//  Path policy
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn passwd_traversal_is_rejected_before_spawn() {
    let skill = skill_with_script("ok.sh", "echo ok");
    let marker = skill.path().join("spawned");
    let executor = ScriptExecutor::new(ScriptExecutionConfig::new().with_mode(SandboxMode::None));

    let err = executor
        .execute(
            Path::new("scripts/../../etc/passwd"),
            skill.path(),
            &[],
            &HashMap::new(),
        )
        .await
        .unwrap_err();

    match err {
        SandboxError::Security { violation_type, .. } => {
            assert_eq!(violation_type, "path_traversal")
        }
        other => panic!("expected security error, got {other:?}"),
    }
    assert!(!marker.exists());
}

#[test]
fn safe_path_requires_scripts_subdirectory() {
    let skill = skill_with_script("ok.sh", "echo ok");
    std::fs::write(skill.path().join("README.md"), "x").unwrap();
    assert!(is_safe_path(Path::new("scripts/ok.sh"), skill.path()));
    assert!(!is_safe_path(Path::new("README.md"), skill.path()));
}

// ═══════════════════════════════════════════════════════════════════════
//  Subprocess mode
// ═══════════════════════════════════════════════════════════════════════

#[cfg(unix)]
#[tokio::test]
async fn subprocess_sanitizes_environment_and_isolates_cwd() {
    let skill = skill_with_script(
        "env.sh",
        "echo \"secret=${OMNIFORGE_TEST_SECRET:-unset}\"\n\
         echo \"extra=$EXTRA\"\n\
         echo \"args=$SKILL_ARGS\"\n\
         echo \"cwd=$(pwd)\"\n",
    );
    let workspace = tempfile::tempdir().unwrap();
    unsafe { std::env::set_var("OMNIFORGE_TEST_SECRET", "leak") };

    let executor = ScriptExecutor::new(
        ScriptExecutionConfig::new().with_workspace_dir(workspace.path()),
    );
    let env = HashMap::from([("EXTRA".to_owned(), "given".to_owned())]);
    let result = executor
        .execute(
            Path::new("scripts/env.sh"),
            skill.path(),
            &["a".to_owned(), "b".to_owned()],
            &env,
        )
        .await
        .unwrap();

    assert!(result.success, "output: {}", result.output);
    assert_eq!(result.exit_code, Some(0));
    assert!(result.output.contains("secret=unset"));
    assert!(result.output.contains("extra=given"));
    assert!(result.output.contains("args=a b"));
    let cwd = workspace.path().canonicalize().unwrap();
    assert!(result.output.contains(&format!("cwd={}", cwd.display())));
}

#[cfg(unix)]
#[tokio::test]
async fn nonzero_exit_is_a_failed_result_with_stderr() {
    let skill = skill_with_script("fail.sh", "echo partial\necho boom >&2\nexit 3\n");
    let result = ScriptExecutor::default()
        .execute(Path::new("scripts/fail.sh"), skill.path(), &[], &HashMap::new())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.exit_code, Some(3));
    assert_eq!(result.output, "partial\n[stderr]\nboom\n");
}

#[cfg(unix)]
#[tokio::test]
async fn wall_clock_timeout_kills_script() {
    let skill = skill_with_script("slow.sh", "sleep 10\n");
    let executor = ScriptExecutor::new(ScriptExecutionConfig::new().with_timeout_ms(200));
    let start = std::time::Instant::now();

    let err = executor
        .execute(Path::new("scripts/slow.sh"), skill.path(), &[], &HashMap::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SandboxError::Timeout { limit_ms: 200 }));
    assert!(start.elapsed() < std::time::Duration::from_secs(5));
}

#[cfg(unix)]
#[tokio::test]
async fn none_mode_runs_in_skill_dir() {
    let skill = skill_with_script("where.sh", "pwd\n");
    let executor = ScriptExecutor::new(ScriptExecutionConfig::new().with_mode(SandboxMode::None));
    let result = executor
        .execute(Path::new("scripts/where.sh"), skill.path(), &[], &HashMap::new())
        .await
        .unwrap();
    let dir = skill.path().canonicalize().unwrap();
    assert_eq!(result.output.trim(), dir.display().to_string());
}
