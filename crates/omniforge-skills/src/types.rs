//! Skill type definitions.
//!
//! A skill is a directory holding a `SKILL.md` file (YAML frontmatter plus a
//! markdown instruction body), optional hook scripts under `scripts/`, and
//! optional supporting reference files linked from the body.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Name of the directory that holds a skill's hook scripts.
pub const SCRIPTS_DIR: &str = "scripts";

/// A fully parsed and loaded skill.  Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    /// Unique skill name / slug (e.g. `pdf-report`).
    pub name: String,

    /// Short human-readable description of what the skill does.
    pub description: String,

    /// Semantic version string (e.g. `1.2.0`).
    pub version: Option<String>,

    /// Execution metadata parsed from the frontmatter.
    pub metadata: SkillMetadata,

    /// The markdown body: instructions for the reasoning engine.
    pub content: String,

    /// Directory the skill was loaded from.
    pub skill_dir: PathBuf,

    /// Hook scripts found under `<skill_dir>/scripts/`.
    #[serde(default)]
    pub scripts: Vec<SkillScript>,
}

impl Skill {
    /// Tool allow-list, `None` when the skill is unrestricted.
    pub fn allowed_tools(&self) -> Option<&[String]> {
        self.metadata.allowed_tools.as_deref()
    }

    /// Whether the skill bundles any hook scripts.
    pub fn has_scripts(&self) -> bool {
        !self.scripts.is_empty()
    }

    /// The `<skill_dir>/scripts` directory.
    pub fn scripts_dir(&self) -> PathBuf {
        self.skill_dir.join(SCRIPTS_DIR)
    }

    /// Look up a hook script by file name.
    pub fn script(&self, filename: &str) -> Option<&SkillScript> {
        self.scripts.iter().find(|s| s.filename == filename)
    }
}

/// Execution metadata extracted from the YAML frontmatter.
///
/// `execution_mode` and `context` are kept as written so that an unknown
/// value can be reported and defaulted at execution time rather than
/// failing the load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillMetadata {
    /// Tools the skill may call.  `None` means unrestricted.
    pub allowed_tools: Option<Vec<String>>,

    /// Raw `execution_mode` value (`simple` / `autonomous`).
    pub execution_mode: Option<String>,

    /// Raw `context` value (`inherit` / `fork`).
    pub context: Option<String>,

    pub max_iterations: Option<u32>,

    pub max_retries_per_tool: Option<u32>,

    /// Raw duration string, e.g. `30s`, `1m`, `500ms`.
    pub timeout_per_iteration: Option<String>,

    /// Model override for the reasoning engine.
    pub model: Option<String>,

    pub temperature: Option<f64>,

    /// Tags for categorization and search.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A hook script bundled with a skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillScript {
    /// The script filename (e.g. `extract.py`).
    pub filename: String,

    /// Absolute path to the script file.
    pub path: PathBuf,
}

/// How a skill's instructions are carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// A single reasoning call, no tool loop.
    Simple,
    /// The full reason/act/observe loop.
    Autonomous,
}

impl ExecutionMode {
    /// Parse a metadata value, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "simple" => Some(Self::Simple),
            "autonomous" => Some(Self::Autonomous),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple => f.write_str("simple"),
            Self::Autonomous => f.write_str("autonomous"),
        }
    }
}

/// Whether a skill runs in its caller's context or a forked sub-agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    #[default]
    Inherit,
    Fork,
}

impl ContextMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inherit" => Some(Self::Inherit),
            "fork" => Some(Self::Fork),
            _ => None,
        }
    }
}

/// Short listing entry used by `list_skills`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillSummary {
    pub name: String,
    pub description: String,
    pub path: PathBuf,
}

impl From<&Skill> for SkillSummary {
    fn from(skill: &Skill) -> Self {
        Self {
            name: skill.name.clone(),
            description: skill.description.clone(),
            path: skill.skill_dir.clone(),
        }
    }
}

/// Returns `true` when `path` lies lexically inside `<skill_dir>/scripts`.
pub fn is_under_scripts_dir(path: &Path, skill_dir: &Path) -> bool {
    path.starts_with(skill_dir.join(SCRIPTS_DIR))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_mode_parse_is_case_insensitive() {
        assert_eq!(ExecutionMode::parse("Simple"), Some(ExecutionMode::Simple));
        assert_eq!(
            ExecutionMode::parse(" AUTONOMOUS "),
            Some(ExecutionMode::Autonomous)
        );
        assert_eq!(ExecutionMode::parse("turbo"), None);
    }

    #[test]
    fn context_mode_defaults_to_inherit() {
        assert_eq!(ContextMode::default(), ContextMode::Inherit);
        assert_eq!(ContextMode::parse("fork"), Some(ContextMode::Fork));
        assert_eq!(ContextMode::parse("spawn"), None);
    }

    #[test]
    fn scripts_dir_check_is_lexical() {
        let dir = Path::new("/skills/demo");
        assert!(is_under_scripts_dir(
            Path::new("/skills/demo/scripts/run.sh"),
            dir
        ));
        assert!(!is_under_scripts_dir(
            Path::new("/skills/demo/reference.md"),
            dir
        ));
        assert!(!is_under_scripts_dir(
            Path::new("/skills/demo/scripts-old/run.sh"),
            dir
        ));
    }
}
