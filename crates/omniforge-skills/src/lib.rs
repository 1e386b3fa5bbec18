//! Skills for OmniForge: the skill model and the content pipeline.
//!
//! This crate provides:
//!
//! - **SKILL.md parser**: YAML frontmatter with execution metadata
//!   (`execution_mode`, `context`, `allowed_tools`, iteration and timeout
//!   overrides) plus a markdown instruction body.
//!
//! - **Skill loader**: the [`SkillLoader`] trait and a filesystem
//!   implementation that also discovers hook scripts under `scripts/`.
//!
//! - **Preprocessing**: [`ContextLoader`] (progressive loading of
//!   supporting files), [`DynamicInjector`] (allow-listed command markers)
//!   and [`StringSubstitutor`] (placeholders), run in that order by
//!   [`Preprocessor`].

pub mod context_loader;
pub mod error;
pub mod injector;
pub mod loader;
pub mod parser;
pub mod pipeline;
pub mod substitutor;
pub mod types;

pub use context_loader::{ContextLoader, FileReference, LoadedContext};
pub use error::{Result, SkillError};
pub use injector::{DynamicInjector, InjectedContent, InjectionMarker, InjectionRecord};
pub use loader::{FsSkillLoader, SkillLoader, default_skills_dir, load_skills_from_dir};
pub use parser::parse_skill_md;
pub use pipeline::{PreparedSkill, Preprocessor};
pub use substitutor::{StringSubstitutor, SubstitutedContent, SubstitutionContext};
pub use types::{
    ContextMode, ExecutionMode, SCRIPTS_DIR, Skill, SkillMetadata, SkillScript, SkillSummary,
};
