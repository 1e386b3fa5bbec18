//! Script execution configuration.
//!
//! [`ScriptExecutionConfig`] selects the isolation mode and the resource
//! limits applied to every hook script run.  Defaults are conservative:
//! subprocess isolation, no network, no workspace writes.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Environment variables passed through from the host by default.
pub const DEFAULT_ENV_ALLOWLIST: &[&str] =
    &["PATH", "HOME", "LANG", "LC_ALL", "TZ", "TERM", "USER"];

/// How hook scripts are isolated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxMode {
    /// Plain subprocess with the host environment.  Development only.
    None,
    /// Subprocess with sanitized environment, rlimits and a workspace cwd.
    #[default]
    Subprocess,
    /// One-shot container per run.
    Docker,
}

impl SandboxMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "subprocess" => Some(Self::Subprocess),
            "docker" => Some(Self::Docker),
            _ => None,
        }
    }
}

impl fmt::Display for SandboxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Subprocess => "subprocess",
            Self::Docker => "docker",
        };
        f.write_str(s)
    }
}

/// Resource limits and permissions for hook scripts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptExecutionConfig {
    pub mode: SandboxMode,

    /// Wall-clock limit per run, in milliseconds.
    ///
    /// Default: **30 000 ms**.
    pub timeout_ms: u64,

    /// Address-space limit (subprocess) or container memory quota, in MiB.
    ///
    /// Default: **512 MiB**.
    pub memory_limit_mb: u64,

    /// CPU-time limit in seconds.
    ///
    /// Default: **30 s**.
    pub cpu_time_limit_secs: u64,

    /// CPU share for containers (`docker run --cpus`).
    ///
    /// Default: **1.0**.
    pub docker_cpus: f64,

    /// Default: **false**.
    pub allow_network: bool,

    /// Whether the workspace is writable.
    ///
    /// Default: **false**.
    pub allow_write: bool,

    /// Working directory for scripts.  A fresh temporary directory is used
    /// per run when unset.
    pub workspace_dir: Option<PathBuf>,

    /// Host variables passed through to the script.
    pub env_allowlist: Vec<String>,
}

impl Default for ScriptExecutionConfig {
    fn default() -> Self {
        Self {
            mode: SandboxMode::Subprocess,
            timeout_ms: 30_000,
            memory_limit_mb: 512,
            cpu_time_limit_secs: 30,
            docker_cpus: 1.0,
            allow_network: false,
            allow_write: false,
            workspace_dir: None,
            env_allowlist: DEFAULT_ENV_ALLOWLIST.iter().map(|v| (*v).to_owned()).collect(),
        }
    }
}

impl ScriptExecutionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: SandboxMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn with_memory_limit_mb(mut self, mb: u64) -> Self {
        self.memory_limit_mb = mb;
        self
    }

    pub fn with_cpu_time_limit_secs(mut self, secs: u64) -> Self {
        self.cpu_time_limit_secs = secs;
        self
    }

    pub fn with_docker_cpus(mut self, cpus: f64) -> Self {
        self.docker_cpus = cpus;
        self
    }

    pub fn with_allow_network(mut self, allow: bool) -> Self {
        self.allow_network = allow;
        self
    }

    pub fn with_allow_write(mut self, allow: bool) -> Self {
        self.allow_write = allow;
        self
    }

    pub fn with_workspace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workspace_dir = Some(dir.into());
        self
    }

    pub fn with_env_allowlist(mut self, vars: Vec<String>) -> Self {
        self.env_allowlist = vars;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = ScriptExecutionConfig::default();
        assert_eq!(cfg.mode, SandboxMode::Subprocess);
        assert_eq!(cfg.timeout_ms, 30_000);
        assert_eq!(cfg.memory_limit_mb, 512);
        assert!(!cfg.allow_network);
        assert!(!cfg.allow_write);
        assert!(cfg.workspace_dir.is_none());
        assert!(cfg.env_allowlist.iter().any(|v| v == "PATH"));
    }

    #[test]
    fn builder_chaining() {
        let cfg = ScriptExecutionConfig::new()
            .with_mode(SandboxMode::Docker)
            .with_timeout_ms(1000)
            .with_memory_limit_mb(128)
            .with_docker_cpus(0.5)
            .with_allow_network(true)
            .with_workspace_dir("/tmp/ws");
        assert_eq!(cfg.mode, SandboxMode::Docker);
        assert_eq!(cfg.timeout_ms, 1000);
        assert_eq!(cfg.memory_limit_mb, 128);
        assert_eq!(cfg.docker_cpus, 0.5);
        assert!(cfg.allow_network);
        assert_eq!(cfg.workspace_dir, Some(PathBuf::from("/tmp/ws")));
    }

    #[test]
    fn mode_parse_and_display() {
        assert_eq!(SandboxMode::parse("Docker"), Some(SandboxMode::Docker));
        assert_eq!(SandboxMode::parse("chroot"), None);
        assert_eq!(SandboxMode::None.to_string(), "none");
    }
}
