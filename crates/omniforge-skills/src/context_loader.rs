//! Progressive context loading.
//!
//! Only the skill's main document enters the initial prompt.  Supporting
//! files linked from it are catalogued (name, description, size hint) so
//! the agent can request them later, which keeps the initial token cost
//! independent of how much reference material a skill ships.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SkillError};
use crate::types::{SCRIPTS_DIR, Skill};

/// Extensions of supporting files that may be catalogued.
const SUPPORTED_EXTENSIONS: &[&str] = &[
    "md", "markdown", "txt", "rst", "json", "yaml", "yml", "toml", "csv", "xml", "html",
];

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]\n]+)\]\(([^)\s]+)\)").expect("valid regex"));

static LINES_HINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[(~]\s*~?\s*(\d+)\s*lines?\s*\)?").expect("valid regex")
});

/// A catalogued supporting file.  Its body is never loaded up front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    /// Absolute path to the file.
    pub path: PathBuf,
    pub description: String,
    /// Size hint taken from the link line, e.g. `~120 lines`.
    pub estimated_lines: Option<u32>,
}

/// The initial context handed to the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadedContext {
    pub skill_content: String,
    /// Keyed by the relative path as written in the link.
    pub available_files: BTreeMap<String, FileReference>,
    pub skill_dir: PathBuf,
    pub line_count: usize,
}

impl LoadedContext {
    /// Render the catalogue section appended to the system prompt.
    /// Empty when the skill has no supporting files.
    pub fn catalogue(&self) -> String {
        if self.available_files.is_empty() {
            return String::new();
        }
        let mut out = String::from(
            "## Available supporting files\n\nLoad these on demand with the `load_file` tool.\n\n",
        );
        for (name, file) in &self.available_files {
            out.push_str(&format!("- `{name}`: {}", file.description));
            if let Some(lines) = file.estimated_lines {
                out.push_str(&format!(" (~{lines} lines)"));
            }
            out.push('\n');
        }
        out
    }
}

/// Builds [`LoadedContext`] values and serves on-demand file loads.
#[derive(Debug, Clone, Default)]
pub struct ContextLoader;

impl ContextLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load the main document and catalogue its supporting files.
    pub fn load_initial_context(&self, skill: &Skill) -> LoadedContext {
        let available_files = catalogue_references(&skill.content, &skill.skill_dir);
        tracing::debug!(
            skill = %skill.name,
            files = available_files.len(),
            "catalogued supporting files"
        );
        LoadedContext {
            line_count: skill.content.lines().count(),
            skill_content: skill.content.clone(),
            available_files,
            skill_dir: skill.skill_dir.clone(),
        }
    }

    /// Read a catalogued file.  Accepts the catalogue key or the bare file
    /// name; anything not in the catalogue is refused.
    pub async fn load_file(&self, context: &LoadedContext, name: &str) -> Result<String> {
        let reference = context.available_files.get(name).or_else(|| {
            context
                .available_files
                .values()
                .find(|f| f.path.file_name().is_some_and(|n| n == name))
        });
        let Some(reference) = reference else {
            return Err(SkillError::FileNotCatalogued {
                skill: context.skill_dir.display().to_string(),
                name: name.to_owned(),
            });
        };
        // The link target may have been swapped for a symlink since cataloguing.
        let path = tokio::fs::canonicalize(&reference.path).await?;
        let root = tokio::fs::canonicalize(&context.skill_dir).await?;
        if !path.starts_with(&root) {
            tracing::warn!(
                file = %reference.path.display(),
                resolved = %path.display(),
                "supporting file resolves outside the skill directory"
            );
            return Err(SkillError::FileNotCatalogued {
                skill: context.skill_dir.display().to_string(),
                name: name.to_owned(),
            });
        }
        let body = tokio::fs::read_to_string(&path).await?;
        tracing::debug!(file = %reference.path.display(), bytes = body.len(), "loaded supporting file");
        Ok(body)
    }
}

fn catalogue_references(content: &str, skill_dir: &Path) -> BTreeMap<String, FileReference> {
    let mut files = BTreeMap::new();

    for line in content.lines() {
        for cap in LINK_RE.captures_iter(line) {
            let (Some(whole), Some(label), Some(target)) = (cap.get(0), cap.get(1), cap.get(2))
            else {
                continue;
            };
            let target = target.as_str().split('#').next().unwrap_or_default();
            let Some(path) = resolve_reference(target, skill_dir) else {
                continue;
            };

            let rest = &line[whole.end()..];
            let estimated_lines = LINES_HINT_RE
                .captures(rest)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse().ok());
            let description = describe(label.as_str(), rest);

            files.entry(target.to_owned()).or_insert(FileReference {
                path,
                description,
                estimated_lines,
            });
        }
    }

    files
}

/// Resolve a link target to a supported file inside the skill directory.
/// The result is canonical, so symlinks leading out of the directory (or
/// into `scripts/`) are refused.
fn resolve_reference(target: &str, skill_dir: &Path) -> Option<PathBuf> {
    if target.is_empty() || target.contains("://") || target.starts_with("mailto:") {
        return None;
    }
    let rel = Path::new(target);
    let plain = rel
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !plain || rel.starts_with(SCRIPTS_DIR) {
        return None;
    }
    let ext = rel.extension()?.to_str()?.to_ascii_lowercase();
    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }
    let root = skill_dir.canonicalize().ok()?;
    let path = skill_dir.join(rel).canonicalize().ok()?;
    let contained = path.starts_with(&root) && !path.starts_with(root.join(SCRIPTS_DIR));
    (contained && path.is_file()).then_some(path)
}

fn describe(label: &str, rest: &str) -> String {
    let stripped = LINES_HINT_RE.replace_all(rest, "");
    let text = stripped
        .trim()
        .trim_start_matches(['-', ':', '—', '–'])
        .trim()
        .trim_end_matches(['.', ',', ';'])
        .trim();
    if text.is_empty() {
        label.trim().to_owned()
    } else {
        text.to_owned()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
