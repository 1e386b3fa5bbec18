//! Sandbox error types.
//!
//! Every public API in this crate reports failures through [`SandboxError`].

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// A script path failed validation.  Never retried.
    #[error("security violation ({violation_type}): {}", path.display())]
    Security {
        violation_type: String,
        path: PathBuf,
    },

    #[error("script not found: {}", path.display())]
    ScriptNotFound { path: PathBuf },

    #[error("unsupported script type: {}", path.display())]
    UnsupportedLanguage { path: PathBuf },

    /// The requested isolation cannot be provided on this host.
    #[error("sandbox unavailable ({mode}): {reason}")]
    Unavailable { mode: String, reason: String },

    /// Execution exceeded the configured time limit.
    #[error("timeout: execution exceeded {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    #[error("script execution error: {reason}")]
    Execution { reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    pub fn is_security(&self) -> bool {
        matches!(self, Self::Security { .. })
    }
}

/// Convenience alias used throughout the sandbox crate.
pub type Result<T> = std::result::Result<T, SandboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_error_display() {
        let err = SandboxError::Security {
            violation_type: "path_traversal".into(),
            path: PathBuf::from("scripts/../../etc/passwd"),
        };
        assert_eq!(
            err.to_string(),
            "security violation (path_traversal): scripts/../../etc/passwd"
        );
        assert!(err.is_security());
    }

    #[test]
    fn timeout_error_display() {
        let err = SandboxError::Timeout { limit_ms: 5000 };
        assert_eq!(err.to_string(), "timeout: execution exceeded 5000ms");
        assert!(!err.is_security());
    }
}
