//! The fixed preprocessing order: load, inject, substitute.
//!
//! Injection runs before substitution so placeholder values supplied by the
//! caller can never be turned into command markers.

use serde::{Deserialize, Serialize};

use crate::context_loader::{ContextLoader, LoadedContext};
use crate::injector::{DynamicInjector, InjectionRecord};
use crate::substitutor::{StringSubstitutor, SubstitutionContext};
use crate::types::Skill;

/// Skill content ready for the reasoning engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedSkill {
    /// Context with `skill_content` replaced by the fully processed text.
    pub context: LoadedContext,
    pub injections: Vec<InjectionRecord>,
    pub substitutions_made: usize,
    pub undefined_vars: Vec<String>,
}

/// Runs [`ContextLoader`], [`DynamicInjector`] and [`StringSubstitutor`]
/// in order.
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    loader: ContextLoader,
    injector: DynamicInjector,
    substitutor: StringSubstitutor,
}

impl Preprocessor {
    pub fn new(injector: DynamicInjector) -> Self {
        Self {
            loader: ContextLoader::new(),
            injector,
            substitutor: StringSubstitutor::new(),
        }
    }

    pub fn context_loader(&self) -> &ContextLoader {
        &self.loader
    }

    pub async fn prepare(&self, skill: &Skill, vars: &SubstitutionContext) -> PreparedSkill {
        let mut context = self.loader.load_initial_context(skill);
        let injected = self
            .injector
            .process(&context.skill_content, &context.skill_dir)
            .await;
        let substituted = self.substitutor.substitute(&injected.content, vars);

        tracing::debug!(
            skill = %skill.name,
            lines = context.line_count,
            files = context.available_files.len(),
            injections = injected.injections.len(),
            substitutions = substituted.substitutions_made,
            "skill content preprocessed"
        );

        context.skill_content = substituted.content;
        PreparedSkill {
            context,
            injections: injected.injections,
            substitutions_made: substituted.substitutions_made,
            undefined_vars: substituted.undefined_vars,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SkillMetadata;

    #[tokio::test]
    async fn argument_values_are_not_injected() {
        let tmp = tempfile::tempdir().unwrap();
        let skill = Skill {
            name: "order".into(),
            description: "order".into(),
            version: None,
            metadata: SkillMetadata::default(),
            content: "Input: $ARGUMENTS".into(),
            skill_dir: tmp.path().to_path_buf(),
            scripts: Vec::new(),
        };
        let injector = DynamicInjector::new().with_allowed_commands(vec!["date".into()]);
        let pre = Preprocessor::new(injector);
        let prepared = pre
            .prepare(&skill, &SubstitutionContext::new("!`date`"))
            .await;

        assert_eq!(prepared.context.skill_content, "Input: !`date`");
        assert!(prepared.injections.is_empty());
        assert_eq!(prepared.substitutions_made, 1);
    }
}
