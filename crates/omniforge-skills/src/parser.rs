//! SKILL.md parser.
//!
//! A SKILL.md file consists of:
//! 1. YAML frontmatter delimited by `---` lines.
//! 2. Markdown body containing instructions for the reasoning engine.
//!
//! ```text
//! ---
//! name: pdf-report
//! description: Build a PDF report from CSV data.
//! execution_mode: autonomous
//! context: fork
//! max_iterations: 10
//! timeout_per_iteration: 45s
//! allowed_tools:
//!   - read
//!   - run_script
//! ---
//!
//! # PDF Report
//!
//! Instructions go here...
//! ```

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{Result, SkillError};
use crate::types::{Skill, SkillMetadata};

/// Raw frontmatter as written.  Hyphenated spellings are accepted as aliases.
#[derive(Debug, serde::Deserialize)]
struct RawFrontmatter {
    name: Option<String>,
    description: Option<String>,
    version: Option<Value>,
    #[serde(alias = "allowed-tools", alias = "allowedTools")]
    allowed_tools: Option<ToolList>,
    #[serde(alias = "execution-mode", alias = "mode")]
    execution_mode: Option<String>,
    context: Option<String>,
    #[serde(alias = "max-iterations")]
    max_iterations: Option<u32>,
    #[serde(alias = "max-retries-per-tool")]
    max_retries_per_tool: Option<u32>,
    #[serde(alias = "timeout-per-iteration")]
    timeout_per_iteration: Option<Value>,
    model: Option<String>,
    temperature: Option<f64>,
    #[serde(default)]
    tags: Option<ToolList>,
}

/// A list given either as a YAML sequence or as a comma-separated string.
#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum ToolList {
    List(Vec<String>),
    Csv(String),
}

impl ToolList {
    fn into_vec(self) -> Vec<String> {
        let items = match self {
            Self::List(items) => items,
            Self::Csv(s) => s.split(',').map(str::to_owned).collect(),
        };
        items
            .into_iter()
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// Split a SKILL.md file into YAML frontmatter and markdown body.
///
/// Returns `(yaml_str, markdown_body)`.
fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let rest = content.trim_start().strip_prefix("---")?;
    let end = rest.find("\n---")?;
    let yaml = rest[..end].trim();
    let body = rest[end + 4..].trim_start_matches(['\n', '\r']);
    Some((yaml, body))
}

/// Parse a SKILL.md file from its text content.
///
/// `skill_dir` is recorded on the returned [`Skill`]; scripts are attached
/// by the loader.
pub fn parse_skill_md(content: &str, source_path: &Path, skill_dir: &Path) -> Result<Skill> {
    let (yaml_str, body) = split_frontmatter(content).ok_or_else(|| SkillError::InvalidFormat {
        path: source_path.to_path_buf(),
        reason: "missing YAML frontmatter (must start with ---)".into(),
    })?;

    let json = yaml_to_json(yaml_str);
    let fm: RawFrontmatter =
        serde_json::from_value(json).map_err(|e| SkillError::InvalidFormat {
            path: source_path.to_path_buf(),
            reason: format!("frontmatter error: {e}"),
        })?;

    let name = fm.name.ok_or_else(|| SkillError::MissingField {
        path: source_path.to_path_buf(),
        field: "name".into(),
    })?;

    let description = fm
        .description
        .unwrap_or_else(|| format!("Skill: {name}"));

    let metadata = SkillMetadata {
        allowed_tools: fm.allowed_tools.map(ToolList::into_vec),
        execution_mode: fm.execution_mode,
        context: fm.context,
        max_iterations: fm.max_iterations,
        max_retries_per_tool: fm.max_retries_per_tool,
        timeout_per_iteration: fm.timeout_per_iteration.and_then(scalar_to_string),
        model: fm.model,
        temperature: fm.temperature,
        tags: fm.tags.map(ToolList::into_vec).unwrap_or_default(),
    };

    Ok(Skill {
        name,
        description,
        version: fm.version.and_then(scalar_to_string),
        metadata,
        content: body.to_owned(),
        skill_dir: skill_dir.to_path_buf(),
        scripts: Vec::new(),
    })
}

/// Numbers in the frontmatter (`version: 1.0`, `timeout_per_iteration: 30`)
/// are kept as their textual form.
fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Minimal YAML reader
// ---------------------------------------------------------------------------

/// Convert the subset of YAML used in frontmatter into a JSON value:
/// scalar key/value pairs, nested maps, block sequences (`- item`) and
/// flow sequences (`[a, b]`).
fn yaml_to_json(yaml: &str) -> Value {
    let lines: Vec<(usize, &str)> = yaml
        .lines()
        .filter(|l| {
            let t = l.trim();
            !t.is_empty() && !t.starts_with('#')
        })
        .map(|l| (l.len() - l.trim_start().len(), l.trim()))
        .collect();
    let mut pos = 0;
    Value::Object(read_map(&lines, &mut pos, 0))
}

fn read_map(lines: &[(usize, &str)], pos: &mut usize, indent: usize) -> Map<String, Value> {
    let mut map = Map::new();
    while let Some(&(line_indent, text)) = lines.get(*pos) {
        if line_indent < indent {
            break;
        }
        *pos += 1;
        let Some((key, value)) = text.split_once(':') else {
            continue;
        };
        let key = key.trim().to_owned();
        let value = value.trim();
        if !value.is_empty() {
            map.insert(key, parse_scalar(value));
            continue;
        }
        match lines.get(*pos) {
            Some(&(child, next)) if child > line_indent || next.starts_with("- ") => {
                if next.starts_with("- ") {
                    map.insert(key, read_list(lines, pos, child));
                } else {
                    map.insert(key, Value::Object(read_map(lines, pos, child)));
                }
            }
            _ => {
                map.insert(key, Value::Null);
            }
        }
    }
    map
}

fn read_list(lines: &[(usize, &str)], pos: &mut usize, indent: usize) -> Value {
    let mut items = Vec::new();
    while let Some(&(line_indent, text)) = lines.get(*pos) {
        if line_indent < indent {
            break;
        }
        let Some(item) = text.strip_prefix("- ").or(text.strip_prefix('-')) else {
            break;
        };
        items.push(parse_scalar(item));
        *pos += 1;
    }
    Value::Array(items)
}

fn parse_scalar(raw: &str) -> Value {
    let s = raw.trim();
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        return Value::String(s[1..s.len() - 1].to_owned());
    }

    if let Some(inner) = s.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        if let Ok(v) = serde_json::from_str::<Value>(s) {
            return v;
        }
        return Value::Array(
            inner
                .split(',')
                .map(str::trim)
                .filter(|i| !i.is_empty())
                .map(|i| Value::String(i.trim_matches(['"', '\'']).to_owned()))
                .collect(),
        );
    }

    match s {
        "true" | "yes" | "on" => return Value::Bool(true),
        "false" | "no" | "off" => return Value::Bool(false),
        "null" | "~" => return Value::Null,
        _ => {}
    }

    if let Ok(n) = s.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Ok(n) = s.parse::<f64>()
        && let Some(n) = serde_json::Number::from_f64(n)
    {
        return Value::Number(n);
    }

    Value::String(s.to_owned())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<Skill> {
        parse_skill_md(
            content,
            Path::new("/skills/demo/SKILL.md"),
            Path::new("/skills/demo"),
        )
    }

    #[test]
    fn parse_full_metadata() {
        let content = r#"---
name: pdf-report
description: Build a PDF report from CSV data.
version: 1.2.0
execution_mode: autonomous
context: fork
max_iterations: 10
max_retries_per_tool: 2
timeout_per_iteration: 45s
model: claude-sonnet-4-20250514
temperature: 0.2
allowed_tools:
  - read
  - run_script
tags: [reports, pdf]
---

# PDF Report

Use `run_script` to render.
"#;

        let skill = parse(content).unwrap();
        assert_eq!(skill.name, "pdf-report");
        assert_eq!(skill.version.as_deref(), Some("1.2.0"));
        let meta = &skill.metadata;
        assert_eq!(meta.execution_mode.as_deref(), Some("autonomous"));
        assert_eq!(meta.context.as_deref(), Some("fork"));
        assert_eq!(meta.max_iterations, Some(10));
        assert_eq!(meta.max_retries_per_tool, Some(2));
        assert_eq!(meta.timeout_per_iteration.as_deref(), Some("45s"));
        assert_eq!(meta.temperature, Some(0.2));
        assert_eq!(
            meta.allowed_tools,
            Some(vec!["read".to_owned(), "run_script".to_owned()])
        );
        assert_eq!(meta.tags, vec!["reports", "pdf"]);
        assert!(skill.content.starts_with("# PDF Report"));
        assert_eq!(skill.skill_dir, Path::new("/skills/demo"));
    }

    #[test]
    fn allowed_tools_comma_string() {
        let skill = parse("---\nname: a\nallowed-tools: read, write ,grep\n---\nbody").unwrap();
        assert_eq!(
            skill.allowed_tools().unwrap(),
            &["read".to_owned(), "write".to_owned(), "grep".to_owned()]
        );
    }

    #[test]
    fn missing_allowed_tools_is_unrestricted() {
        let skill = parse("---\nname: open\n---\nbody").unwrap();
        assert!(skill.allowed_tools().is_none());
        assert_eq!(skill.description, "Skill: open");
    }

    #[test]
    fn numeric_timeout_kept_as_text() {
        let skill = parse("---\nname: a\ntimeout_per_iteration: 30\n---\nbody").unwrap();
        assert_eq!(skill.metadata.timeout_per_iteration.as_deref(), Some("30"));
    }

    #[test]
    fn missing_name_fails() {
        let result = parse("---\ndescription: no name\n---\nbody\n");
        assert!(matches!(result, Err(SkillError::MissingField { .. })));
    }

    #[test]
    fn missing_frontmatter_fails() {
        let result = parse("# No frontmatter\nJust markdown.");
        assert!(matches!(result, Err(SkillError::InvalidFormat { .. })));
    }

    #[test]
    fn split_frontmatter_works() {
        let (yaml, body) = split_frontmatter("---\nfoo: bar\n---\nbody here").unwrap();
        assert_eq!(yaml, "foo: bar");
        assert_eq!(body, "body here");
    }

    #[test]
    fn yaml_nested_map_and_list() {
        let v = yaml_to_json("outer:\n  inner: 3\nitems:\n  - one\n  - \"two\"\nflag: yes");
        assert_eq!(v["outer"]["inner"], 3);
        assert_eq!(v["items"][1], "two");
        assert_eq!(v["flag"], true);
    }

    #[test]
    fn yaml_list_at_same_indent() {
        let v = yaml_to_json("allowed_tools:\n- read\n- write\nname: x");
        assert_eq!(v["allowed_tools"].as_array().unwrap().len(), 2);
        assert_eq!(v["name"], "x");
    }

    #[test]
    fn yaml_flow_sequence_unquoted() {
        let v = yaml_to_json("tags: [email, automation]");
        assert_eq!(v["tags"][0], "email");
        assert!(yaml_to_json("env: []")["env"].as_array().unwrap().is_empty());
    }
}
