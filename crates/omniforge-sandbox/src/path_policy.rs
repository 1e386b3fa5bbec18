//! Script path policy.
//!
//! A hook script may only run if it resolves strictly inside
//! `<skill_dir>/scripts/`.  Two independent checks apply: any path string
//! containing `..` is refused outright, and the canonical script path must
//! sit below the canonical scripts directory (which also catches symlinks
//! pointing elsewhere).

use std::path::{Path, PathBuf};

use crate::error::{Result, SandboxError};

/// Name of the scripts directory inside a skill.
pub const SCRIPTS_DIR: &str = "scripts";

/// Violation type recorded for paths escaping the scripts directory.
pub const PATH_TRAVERSAL: &str = "path_traversal";

/// Returns `true` iff `path` names an existing file strictly inside
/// `<skill_dir>/scripts/` and contains no `..`.
///
/// Relative paths are resolved against `skill_dir`.
pub fn is_safe_path(path: &Path, skill_dir: &Path) -> bool {
    resolve(path, skill_dir).is_ok_and(|r| r.is_some())
}

/// Validate a script path and return its canonical form.
///
/// Escapes raise [`SandboxError::Security`] with violation type
/// `path_traversal` and are written to the audit log.  A path that is
/// lexically fine but does not exist yields [`SandboxError::ScriptNotFound`].
pub fn validate_script_path(path: &Path, skill_dir: &Path) -> Result<PathBuf> {
    match resolve(path, skill_dir) {
        Ok(Some(canonical)) => Ok(canonical),
        Ok(None) => {
            tracing::warn!(
                target: "omniforge::audit",
                violation_type = PATH_TRAVERSAL,
                path = %path.display(),
                skill_dir = %skill_dir.display(),
                "script path rejected"
            );
            Err(SandboxError::Security {
                violation_type: PATH_TRAVERSAL.into(),
                path: path.to_path_buf(),
            })
        }
        Err(e) => Err(e),
    }
}

/// `Ok(Some(canonical))` when safe, `Ok(None)` when the path escapes,
/// `Err` when it is inside but missing.
fn resolve(path: &Path, skill_dir: &Path) -> Result<Option<PathBuf>> {
    if path.to_string_lossy().contains("..") {
        return Ok(None);
    }

    let candidate = if path.is_absolute() {
        path.to_path_buf()
    } else {
        skill_dir.join(path)
    };

    let Ok(root) = skill_dir.canonicalize() else {
        return Ok(None);
    };
    let scripts_dir = root.join(SCRIPTS_DIR);

    let canonical = match candidate.canonicalize() {
        Ok(c) => c,
        Err(_) => {
            let lexical_inside = candidate.starts_with(skill_dir.join(SCRIPTS_DIR))
                || candidate.starts_with(&scripts_dir);
            return if lexical_inside {
                Err(SandboxError::ScriptNotFound { path: candidate })
            } else {
                Ok(None)
            };
        }
    };

    if canonical != scripts_dir && canonical.starts_with(&scripts_dir) && canonical.is_file() {
        Ok(Some(canonical))
    } else {
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn skill_fixture() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("scripts/nested")).unwrap();
        std::fs::write(tmp.path().join("scripts/run.sh"), "echo ok").unwrap();
        std::fs::write(tmp.path().join("scripts/nested/deep.py"), "print(1)").unwrap();
        std::fs::write(tmp.path().join("SKILL.md"), "---\nname: x\n---\n").unwrap();
        tmp
    }

    #[test]
    fn accepts_files_inside_scripts_dir() {
        let tmp = skill_fixture();
        let dir = tmp.path();
        assert!(is_safe_path(Path::new("scripts/run.sh"), dir));
        assert!(is_safe_path(Path::new("scripts/nested/deep.py"), dir));
        assert!(is_safe_path(&dir.join("scripts/run.sh"), dir));
    }

    #[test]
    fn rejects_parent_segments_even_when_resolving_inside() {
        let tmp = skill_fixture();
        let dir = tmp.path();
        assert!(!is_safe_path(Path::new("scripts/nested/../run.sh"), dir));
        assert!(!is_safe_path(Path::new("scripts/../../etc/passwd"), dir));
    }

    #[test]
    fn rejects_paths_outside_scripts_dir() {
        let tmp = skill_fixture();
        let dir = tmp.path();
        assert!(!is_safe_path(Path::new("SKILL.md"), dir));
        assert!(!is_safe_path(Path::new("scripts"), dir));
        assert!(!is_safe_path(Path::new("/etc/passwd"), dir));
        assert!(!is_safe_path(Path::new("scripts/missing.sh"), dir));
    }

    #[cfg(unix)]
    #[test]
    fn rejects_symlink_escape() {
        let tmp = skill_fixture();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.sh"), "cat /etc/shadow").unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.sh"),
            tmp.path().join("scripts/link.sh"),
        )
        .unwrap();
        assert!(!is_safe_path(Path::new("scripts/link.sh"), tmp.path()));
    }

    #[test]
    fn traversal_is_a_security_error() {
        let tmp = skill_fixture();
        let err = validate_script_path(Path::new("scripts/../../etc/passwd"), tmp.path())
            .unwrap_err();
        match err {
            SandboxError::Security {
                violation_type,
                path,
            } => {
                assert_eq!(violation_type, PATH_TRAVERSAL);
                assert_eq!(path, PathBuf::from("scripts/../../etc/passwd"));
            }
            other => panic!("expected security error, got {other:?}"),
        }
    }

    #[test]
    fn missing_script_is_not_found() {
        let tmp = skill_fixture();
        let err = validate_script_path(Path::new("scripts/missing.sh"), tmp.path()).unwrap_err();
        assert!(matches!(err, SandboxError::ScriptNotFound { .. }));
    }
}
