//! Hook script sandboxing for OmniForge.
//!
//! - **[`config`]** -- [`ScriptExecutionConfig`] selects the isolation mode
//!   and sets time, memory and CPU limits plus network/write permissions.
//! - **[`path_policy`]** -- scripts must resolve strictly inside
//!   `<skill_dir>/scripts/`; violations are [`SandboxError::Security`].
//! - **[`executor`]** -- [`ScriptExecutor`] runs a validated script as a
//!   plain subprocess, a limited subprocess, or a one-shot container.

pub mod config;
mod docker;
pub mod error;
pub mod executor;
pub mod language;
pub mod path_policy;
mod subprocess;

pub use config::{DEFAULT_ENV_ALLOWLIST, SandboxMode, ScriptExecutionConfig};
pub use error::{Result, SandboxError};
pub use executor::{ScriptExecutor, ScriptResult};
pub use language::ScriptLanguage;
pub use path_policy::{PATH_TRAVERSAL, is_safe_path, validate_script_path};
