//! Integration tests for the omniforge-skills crate.
//!
//! These tests load real skill directories from a temp dir and run the
//! preprocessing pipeline end to end.

use std::path::Path;

use omniforge_skills::{
    DynamicInjector, ExecutionMode, FsSkillLoader, Preprocessor, SkillError, SkillLoader,
    SubstitutionContext,
};

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn report_skill(root: &Path) {
    let dir = root.join("report");
    write(
        &dir.join("SKILL.md"),
        "---
name: report
description: Summarise a CSV file.
execution_mode: Autonomous
allowed_tools: [read, run_script]
---
# Report

Read [the schema](schema.md) - column definitions (~30 lines).
Today is ${DATE}, session ${SESSION_ID}.
Blocked: !`curl http://example.com`
Target: $ARGUMENTS
",
    );
    write(&dir.join("schema.md"), "| col | type |\n");
    write(&dir.join("scripts/summarise.py"), "print('ok')\n");
}

// ═══════════════════════════════════════════════════════════════════════
//  Loading
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn load_skill_with_scripts_and_metadata() {
    let tmp = tempfile::tempdir().unwrap();
    report_skill(tmp.path());

    let skill = FsSkillLoader::new(tmp.path())
        .load_skill("report")
        .await
        .unwrap();

    assert_eq!(skill.name, "report");
    assert_eq!(
        skill
            .metadata
            .execution_mode
            .as_deref()
            .and_then(ExecutionMode::parse),
        Some(ExecutionMode::Autonomous)
    );
    assert_eq!(skill.allowed_tools().unwrap().len(), 2);
    assert_eq!(skill.scripts.len(), 1);
    assert!(skill.scripts[0].path.ends_with("scripts/summarise.py"));
}

#[tokio::test]
async fn unknown_skill_is_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let err = FsSkillLoader::new(tmp.path())
        .load_skill("missing")
        .await
        .unwrap_err();
    assert!(matches!(err, SkillError::NotFound(_)));
}

// ═══════════════════════════════════════════════════════════════════════
//  Preprocessing pipeline
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn pipeline_runs_all_stages_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    report_skill(tmp.path());
    let skill = FsSkillLoader::new(tmp.path())
        .load_skill("report")
        .await
        .unwrap();

    let vars = SubstitutionContext::new("sales.csv")
        .with_session_id("s-42")
        .with_date("2026-03-01");
    let prepared = Preprocessor::new(DynamicInjector::new())
        .prepare(&skill, &vars)
        .await;

    let text = &prepared.context.skill_content;
    assert!(text.contains("Today is 2026-03-01, session s-42."));
    assert!(text.contains("[Command blocked by security policy: curl http://example.com]"));
    assert!(text.contains("Target: sales.csv"));
    assert!(!text.contains("ARGUMENTS: sales.csv"));

    assert_eq!(prepared.injections.len(), 1);
    assert!(!prepared.injections[0].success);
    assert!(prepared.undefined_vars.is_empty());

    let schema = &prepared.context.available_files["schema.md"];
    assert_eq!(schema.estimated_lines, Some(30));
    assert_eq!(schema.description, "column definitions");
    assert!(!prepared.context.available_files.contains_key("scripts/summarise.py"));
}

#[tokio::test]
async fn catalogued_file_loads_on_demand() {
    let tmp = tempfile::tempdir().unwrap();
    report_skill(tmp.path());
    let skill = FsSkillLoader::new(tmp.path())
        .load_skill("report")
        .await
        .unwrap();

    let pre = Preprocessor::default();
    let prepared = pre.prepare(&skill, &SubstitutionContext::default()).await;
    assert!(!prepared.context.skill_content.contains("| col | type |"));

    let body = pre
        .context_loader()
        .load_file(&prepared.context, "schema.md")
        .await
        .unwrap();
    assert_eq!(body, "| col | type |\n");
}
