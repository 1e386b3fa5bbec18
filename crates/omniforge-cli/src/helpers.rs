//! Shared helpers for the CLI subcommands.

use std::path::Path;

use anyhow::{Context, Result, bail};
use omniforge_agent::{MessagePart, PlatformConfig, TaskEvent, TaskState};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
pub fn init_tracing(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Load the platform configuration, honouring an explicit path and a
/// skills directory override from the command line.
pub fn load_config(path: Option<&Path>, skills_dir: Option<&Path>) -> Result<PlatformConfig> {
    let mut config = match path {
        Some(path) => {
            let mut config = PlatformConfig::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            config.apply_overrides(|key| std::env::var(key).ok());
            config
        }
        None => PlatformConfig::from_env().context("failed to load configuration")?,
    };
    if let Some(dir) = skills_dir {
        config.orchestrator.skills_dir = dir.to_path_buf();
    }
    Ok(config)
}

/// Split `NAME=VALUE`.
pub fn parse_var(raw: &str) -> Result<(String, String)> {
    let Some((name, value)) = raw.split_once('=') else {
        bail!("invalid variable `{raw}`, expected NAME=VALUE");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("invalid variable `{raw}`, name is empty");
    }
    Ok((name.to_owned(), value.to_owned()))
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Human-readable line for an event, or `None` for events not shown.
pub fn render_event(event: &TaskEvent) -> Option<String> {
    match event {
        TaskEvent::Status { state } => Some(format!("  [{}]", state_label(*state))),
        TaskEvent::Message {
            parts,
            is_partial: true,
        } => parts.iter().find_map(|part| match part {
            MessagePart::Data { data } => {
                let tool = data["tool"].as_str()?;
                let mark = if data["success"].as_bool() == Some(true) {
                    "ok"
                } else {
                    "failed"
                };
                Some(format!("  - {tool}: {mark}"))
            }
            MessagePart::Text { text } => Some(format!("  {text}")),
        }),
        TaskEvent::Message { parts, .. } => {
            let text: Vec<&str> = parts
                .iter()
                .filter_map(|part| match part {
                    MessagePart::Text { text } => Some(text.as_str()),
                    MessagePart::Data { .. } => None,
                })
                .collect();
            Some(format!("\n{}\n", text.join("\n")))
        }
        TaskEvent::Error { code, message } => Some(format!("  Error ({code}): {message}")),
        TaskEvent::Done { final_state } => Some(format!("  [{}]", state_label(*final_state))),
    }
}

pub fn state_label(state: TaskState) -> &'static str {
    match state {
        TaskState::Working => "working",
        TaskState::Completed => "completed",
        TaskState::Failed => "failed",
        TaskState::Cancelled => "cancelled",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_var_splits_on_first_equals() {
        assert_eq!(
            parse_var("QUERY=a=b").unwrap(),
            ("QUERY".to_owned(), "a=b".to_owned())
        );
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=x").is_err());
    }

    #[test]
    fn renders_tool_progress_and_answers() {
        let progress = TaskEvent::Message {
            parts: vec![MessagePart::Data {
                data: serde_json::json!({"tool": "echo", "success": false}),
            }],
            is_partial: true,
        };
        assert_eq!(render_event(&progress).as_deref(), Some("  - echo: failed"));
        assert_eq!(
            render_event(&TaskEvent::answer("hi")).as_deref(),
            Some("\nhi\n")
        );
        assert_eq!(
            render_event(&TaskEvent::done(TaskState::Cancelled)).as_deref(),
            Some("  [cancelled]")
        );
    }
}
