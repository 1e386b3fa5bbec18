//! Platform configuration.
//!
//! [`PlatformConfig`] is read from TOML (or JSON, by extension) and then
//! patched from `OMNIFORGE_*` environment variables.  Configuration
//! problems are never fatal at execution time: bad values are logged and
//! the defaults are kept.

use std::path::{Path, PathBuf};
use std::time::Duration;

use omniforge_sandbox::{SandboxMode, ScriptExecutionConfig};
use omniforge_skills::injector::DEFAULT_ALLOWED_COMMANDS;
use omniforge_skills::{DynamicInjector, SkillMetadata};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::context::DEFAULT_MAX_DEPTH;
use crate::error::{AgentError, Result};

/// Model used when neither the platform nor the skill names one.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Config file consulted when `OMNIFORGE_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config/omniforge.toml";

// ---------------------------------------------------------------------------
// Autonomous execution
// ---------------------------------------------------------------------------

/// Effective settings for one autonomous run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutonomousConfig {
    pub max_iterations: u32,
    pub max_retries_per_tool: u32,
    pub timeout_per_iteration_ms: u64,
    /// Finish with partial results instead of failing when the run is cut
    /// short after making progress.
    pub early_termination: bool,
    pub model: String,
    pub temperature: Option<f64>,
    /// Steer away from exhausted approaches instead of failing the run.
    pub enable_error_recovery: bool,
    pub max_tokens: u32,
}

impl Default for AutonomousConfig {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            max_retries_per_tool: 3,
            timeout_per_iteration_ms: 60_000,
            early_termination: true,
            model: DEFAULT_MODEL.to_owned(),
            temperature: None,
            enable_error_recovery: true,
            max_tokens: 4096,
        }
    }
}

impl AutonomousConfig {
    /// Merge skill overrides over `defaults`, then clamp to `limits`.
    pub fn for_skill(defaults: &Self, meta: &SkillMetadata, limits: &LimitsConfig) -> Self {
        let mut config = defaults.clone();

        if let Some(n) = meta.max_iterations {
            config.max_iterations = n;
        }
        if let Some(n) = meta.max_retries_per_tool {
            config.max_retries_per_tool = n;
        }
        if let Some(raw) = &meta.timeout_per_iteration {
            match parse_duration_ms(raw) {
                Some(ms) => config.timeout_per_iteration_ms = ms,
                None => warn!(
                    value = %raw,
                    default_ms = config.timeout_per_iteration_ms,
                    "unparseable timeout_per_iteration; keeping default"
                ),
            }
        }
        if let Some(model) = meta.model.as_deref().filter(|m| !m.trim().is_empty()) {
            config.model = model.to_owned();
        }
        if let Some(t) = meta.temperature {
            config.temperature = Some(t);
        }

        config.clamp_to(limits);
        config
    }

    /// Pull out-of-range values back into `limits`, logging each change.
    pub fn clamp_to(&mut self, limits: &LimitsConfig) {
        let iterations = self
            .max_iterations
            .clamp(1, limits.max_iterations.max(1));
        if iterations != self.max_iterations {
            warn!(
                requested = self.max_iterations,
                applied = iterations,
                "max_iterations out of bounds"
            );
            self.max_iterations = iterations;
        }

        if self.max_retries_per_tool > limits.max_retries_per_tool {
            warn!(
                requested = self.max_retries_per_tool,
                applied = limits.max_retries_per_tool,
                "max_retries_per_tool out of bounds"
            );
            self.max_retries_per_tool = limits.max_retries_per_tool;
        }

        let timeout = self.timeout_per_iteration_ms.clamp(
            limits.min_timeout_ms,
            limits.max_timeout_ms.max(limits.min_timeout_ms),
        );
        if timeout != self.timeout_per_iteration_ms {
            warn!(
                requested = self.timeout_per_iteration_ms,
                applied = timeout,
                "timeout_per_iteration out of bounds"
            );
            self.timeout_per_iteration_ms = timeout;
        }

        if let Some(t) = self.temperature
            && !(0.0..=1.0).contains(&t)
        {
            warn!(requested = t, "temperature out of bounds; using provider default");
            self.temperature = None;
        }
    }

    pub fn iteration_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_per_iteration_ms)
    }
}

/// Platform-wide bounds applied to every merged [`AutonomousConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_iterations: u32,
    pub max_retries_per_tool: u32,
    pub min_timeout_ms: u64,
    pub max_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            max_retries_per_tool: 10,
            min_timeout_ms: 1_000,
            max_timeout_ms: 600_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Other sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum fork/delegation depth.
    pub max_depth: u32,
    pub skills_dir: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            skills_dir: omniforge_skills::default_skills_dir(),
        }
    }
}

/// Settings for the command-injection stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectionConfig {
    pub allowed_commands: Vec<String>,
    pub timeout_ms: u64,
    pub max_output_chars: usize,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            allowed_commands: DEFAULT_ALLOWED_COMMANDS
                .iter()
                .map(|c| (*c).to_owned())
                .collect(),
            timeout_ms: 5_000,
            max_output_chars: 10_000,
        }
    }
}

impl InjectionConfig {
    pub fn injector(&self) -> DynamicInjector {
        DynamicInjector::new()
            .with_allowed_commands(self.allowed_commands.clone())
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_max_output_chars(self.max_output_chars)
    }
}

/// Prices in USD per million tokens, used for cost estimates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            input_per_mtok: 3.0,
            output_per_mtok: 15.0,
        }
    }
}

impl PricingConfig {
    pub fn estimate_usd(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input_per_mtok + output_tokens as f64 * self.output_per_mtok)
            / 1_000_000.0
    }
}

// ---------------------------------------------------------------------------
// PlatformConfig
// ---------------------------------------------------------------------------

/// Everything the engine reads from configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub autonomous: AutonomousConfig,
    pub limits: LimitsConfig,
    pub orchestrator: OrchestratorConfig,
    pub sandbox: ScriptExecutionConfig,
    pub injection: InjectionConfig,
    pub pricing: PricingConfig,
}

impl PlatformConfig {
    /// Load from `path`.  A missing file yields defaults with a warning.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "configuration file does not exist, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| AgentError::ConfigError {
            reason: format!("failed to read config file: {e}"),
        })?;

        let config: Self = if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&content).map_err(|e| AgentError::ConfigError {
                reason: format!("failed to parse JSON config: {e}"),
            })?
        } else {
            toml::from_str(&content).map_err(|e| AgentError::ConfigError {
                reason: format!("failed to parse TOML config: {e}"),
            })?
        };

        info!(path = %path.display(), "configuration loaded from file");
        Ok(config)
    }

    /// Load from `$OMNIFORGE_CONFIG` (or the default path) and apply
    /// environment overrides.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var("OMNIFORGE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut config = Self::load(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `OMNIFORGE_*` overrides read through `lookup`.  Invalid values
    /// are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("OMNIFORGE_SKILLS_DIR").filter(|d| !d.is_empty()) {
            self.orchestrator.skills_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("OMNIFORGE_MAX_DEPTH") {
            match raw.trim().parse() {
                Ok(depth) => self.orchestrator.max_depth = depth,
                Err(_) => warn!(value = %raw, "invalid OMNIFORGE_MAX_DEPTH ignored"),
            }
        }
        if let Some(raw) = lookup("OMNIFORGE_MAX_ITERATIONS") {
            match raw.trim().parse() {
                Ok(n) => self.autonomous.max_iterations = n,
                Err(_) => warn!(value = %raw, "invalid OMNIFORGE_MAX_ITERATIONS ignored"),
            }
        }
        if let Some(model) = lookup("OMNIFORGE_MODEL").filter(|m| !m.trim().is_empty()) {
            self.autonomous.model = model;
        }
        if let Some(raw) = lookup("OMNIFORGE_SANDBOX_MODE") {
            match SandboxMode::parse(&raw) {
                Some(mode) => self.sandbox.mode = mode,
                None => warn!(value = %raw, "invalid OMNIFORGE_SANDBOX_MODE ignored"),
            }
        }
        self.autonomous.clamp_to(&self.limits);
    }
}

// ---------------------------------------------------------------------------
// Durations
// ---------------------------------------------------------------------------

/// Parse `500ms`, `30s`, `1.5s`, `2m` or `1h` into milliseconds.  A bare
/// number is taken as seconds.  Returns `None` for anything else.
pub fn parse_duration_ms(raw: &str) -> Option<u64> {
    let s = raw.trim().to_ascii_lowercase();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    if number.is_empty() {
        return None;
    }
    let value: f64 = number.parse().ok()?;
    let factor = match unit.trim() {
        "ms" => 1.0,
        "" | "s" | "sec" | "secs" => 1_000.0,
        "m" | "min" | "mins" => 60_000.0,
        "h" => 3_600_000.0,
        _ => return None,
    };
    let ms = (value * factor).round();
    (ms.is_finite() && ms >= 0.0).then_some(ms as u64)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
