//! Skill loader -- resolves skill names to parsed [`Skill`] values.
//!
//! Skills are stored one per directory under a skills root, each holding a
//! `SKILL.md` file and an optional `scripts/` directory.  The engine only
//! depends on the [`SkillLoader`] trait; [`FsSkillLoader`] is the filesystem
//! implementation.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::error::{Result, SkillError};
use crate::parser::parse_skill_md;
use crate::types::{SCRIPTS_DIR, Skill, SkillScript, SkillSummary};

/// Source of skill definitions.
#[async_trait]
pub trait SkillLoader: Send + Sync {
    /// Load a skill by name.  Fails with [`SkillError::NotFound`] if absent.
    async fn load_skill(&self, name: &str) -> Result<Skill>;

    /// List every skill this loader can resolve.
    async fn list_skills(&self) -> Result<Vec<SkillSummary>>;
}

/// Loads skills from `<root>/<name>/SKILL.md`.
#[derive(Debug, Clone)]
pub struct FsSkillLoader {
    root: PathBuf,
}

impl FsSkillLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The skills root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl SkillLoader for FsSkillLoader {
    async fn load_skill(&self, name: &str) -> Result<Skill> {
        validate_skill_name(name)?;
        let dir = self.root.join(name);
        if !dir.join("SKILL.md").is_file() {
            tracing::debug!(skill = %name, root = %self.root.display(), "skill not found");
            return Err(SkillError::NotFound(name.to_owned()));
        }
        let skill = load_skill_from_dir(&dir)?;
        tracing::debug!(
            skill = %skill.name,
            scripts = skill.scripts.len(),
            "loaded skill"
        );
        Ok(skill)
    }

    async fn list_skills(&self) -> Result<Vec<SkillSummary>> {
        Ok(load_skills_from_dir(&self.root)?
            .iter()
            .map(SkillSummary::from)
            .collect())
    }
}

/// Skill names are single path components; anything that could walk out of
/// the skills root is rejected.
fn validate_skill_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(SkillError::InvalidName {
            name: name.to_owned(),
            reason: "must be a single directory name".into(),
        }),
    }
}

/// Load all skills from the given directory.
///
/// Each subdirectory is expected to contain a `SKILL.md` file.
/// Directories without `SKILL.md` are silently skipped; unparsable skills
/// are logged and skipped.
pub fn load_skills_from_dir(dir: &Path) -> Result<Vec<Skill>> {
    if !dir.exists() {
        tracing::debug!(path = %dir.display(), "skills directory does not exist");
        return Ok(Vec::new());
    }

    let mut skills = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_dir() || !path.join("SKILL.md").is_file() {
            continue;
        }
        match load_skill_from_dir(&path) {
            Ok(skill) => skills.push(skill),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to load skill");
            }
        }
    }

    skills.sort_by(|a, b| a.name.cmp(&b.name));
    tracing::info!(count = skills.len(), dir = %dir.display(), "skills loaded");
    Ok(skills)
}

/// Load a single skill from a directory containing `SKILL.md`.
pub fn load_skill_from_dir(dir: &Path) -> Result<Skill> {
    let skill_md = dir.join("SKILL.md");
    let content = std::fs::read_to_string(&skill_md)?;
    let skill_dir = dir.canonicalize()?;
    let mut skill = parse_skill_md(&content, &skill_md, &skill_dir)?;
    skill.scripts = discover_scripts(&skill_dir)?;
    Ok(skill)
}

/// List the regular files in `<dir>/scripts`, sorted by name.
fn discover_scripts(dir: &Path) -> Result<Vec<SkillScript>> {
    let scripts_dir = dir.join(SCRIPTS_DIR);
    if !scripts_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut scripts = Vec::new();
    for entry in std::fs::read_dir(&scripts_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(filename) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        scripts.push(SkillScript { filename, path });
    }
    scripts.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(scripts)
}

/// Return the default skills directory path.
///
/// Priority:
/// 1. `$OMNIFORGE_SKILLS_DIR` environment variable
/// 2. `./skills/` relative to current working directory
pub fn default_skills_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("OMNIFORGE_SKILLS_DIR") {
        return PathBuf::from(dir);
    }
    PathBuf::from("skills")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn write_skill(root: &Path, name: &str, body: &str) -> PathBuf {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("SKILL.md"),
            format!("---\nname: {name}\ndescription: test skill\n---\n{body}"),
        )
        .unwrap();
        dir
    }

    #[test]
    fn load_from_nonexistent_dir() {
        let skills = load_skills_from_dir(Path::new("/nonexistent/path")).unwrap();
        assert!(skills.is_empty());
    }

    #[test]
    fn discovers_scripts_only_under_scripts_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = write_skill(tmp.path(), "my-skill", "Do something.");
        std::fs::write(dir.join("top-level.sh"), "echo no").unwrap();
        std::fs::create_dir(dir.join("scripts")).unwrap();
        std::fs::write(dir.join("scripts/run.sh"), "echo hello").unwrap();
        std::fs::write(dir.join("scripts/extract.py"), "print(1)").unwrap();

        let skill = load_skill_from_dir(&dir).unwrap();
        let names: Vec<_> = skill.scripts.iter().map(|s| s.filename.as_str()).collect();
        assert_eq!(names, vec!["extract.py", "run.sh"]);
        assert!(skill.has_scripts());
    }

    #[tokio::test]
    async fn fs_loader_resolves_by_name() {
        let tmp = tempfile::tempdir().unwrap();
        write_skill(tmp.path(), "alpha", "A");
        write_skill(tmp.path(), "beta", "B");

        let loader = FsSkillLoader::new(tmp.path());
        let skill = loader.load_skill("beta").await.unwrap();
        assert_eq!(skill.name, "beta");
        assert_eq!(skill.content, "B");

        let listed = loader.list_skills().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "alpha");
    }

    #[tokio::test]
    async fn fs_loader_missing_skill_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = FsSkillLoader::new(tmp.path());
        let err = loader.load_skill("ghost").await.unwrap_err();
        assert!(matches!(err, SkillError::NotFound(name) if name == "ghost"));
    }

    #[tokio::test]
    async fn fs_loader_rejects_path_names() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = FsSkillLoader::new(tmp.path());
        for bad in ["../etc", "a/b", ""] {
            let err = loader.load_skill(bad).await.unwrap_err();
            assert!(matches!(err, SkillError::InvalidName { .. }), "{bad}");
        }
    }

    #[test]
    fn default_skills_dir_fallback() {
        unsafe { std::env::remove_var("OMNIFORGE_SKILLS_DIR") };
        assert_eq!(default_skills_dir(), PathBuf::from("skills"));
    }
}
