//! Dynamic context injection.
//!
//! Skill content may embed command markers of the form `` !`git status` ``.
//! Each marker is checked against an allow-list and, when permitted, run
//! (without a shell) in the skill directory; the marker is then replaced by
//! the command's output, a failure marker, or a blocked marker.  Nothing in
//! this stage is fatal.

use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!`([^`\n]+)`").expect("valid regex"));

/// Characters that would only matter to a shell; never accepted.
const SHELL_METACHARACTERS: &[char] = &[';', '|', '&', '$', '`', '>', '<', '(', ')', '\n', '\r'];

/// Default upper bound on injected output, in characters.
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 10_000;

/// Failure reasons are cut to this many characters.
const MAX_FAILURE_REASON_CHARS: usize = 200;

/// Commands permitted when no allow-list is configured.
pub const DEFAULT_ALLOWED_COMMANDS: &[&str] = &[
    "date",
    "pwd",
    "whoami",
    "echo *",
    "ls *",
    "uname *",
    "git status *",
    "git log *",
    "git branch *",
    "git diff *",
];

/// A parsed command marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionMarker {
    /// The marker exactly as written, including `` !` `` and `` ` ``.
    pub raw: String,
    /// The full command line between the backticks.
    pub command_line: String,
    /// Program to run.
    pub program: String,
    pub args: Vec<String>,
}

impl InjectionMarker {
    /// Parse a marker body.  Returns `None` for an empty command.
    pub fn parse(raw: &str, command_line: &str) -> Option<Self> {
        let mut words = split_words(command_line.trim());
        if words.is_empty() {
            return None;
        }
        let program = words.remove(0);
        Some(Self {
            raw: raw.to_owned(),
            command_line: command_line.trim().to_owned(),
            program,
            args: words,
        })
    }
}

/// Outcome of a single injection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionRecord {
    pub command: String,
    pub success: bool,
    /// Text that replaced the marker.
    pub output: String,
}

/// Content after injection, plus what happened to each marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectedContent {
    pub content: String,
    pub injections: Vec<InjectionRecord>,
}

/// Runs command markers against an allow-list.
#[derive(Debug, Clone)]
pub struct DynamicInjector {
    allowed_commands: Vec<String>,
    timeout: Duration,
    max_output_chars: usize,
}

impl Default for DynamicInjector {
    fn default() -> Self {
        Self {
            allowed_commands: DEFAULT_ALLOWED_COMMANDS
                .iter()
                .map(|c| (*c).to_owned())
                .collect(),
            timeout: Duration::from_secs(5),
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
        }
    }
}

impl DynamicInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the allow-list.  A pattern ending in ` *` permits any
    /// arguments after its prefix; other patterns must match exactly.
    pub fn with_allowed_commands(mut self, patterns: Vec<String>) -> Self {
        self.allowed_commands = patterns;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_output_chars(mut self, max: usize) -> Self {
        self.max_output_chars = max;
        self
    }

    /// Find every marker in `content`.
    pub fn find_markers(content: &str) -> Vec<InjectionMarker> {
        MARKER_RE
            .captures_iter(content)
            .filter_map(|c| InjectionMarker::parse(c.get(0)?.as_str(), c.get(1)?.as_str()))
            .collect()
    }

    /// Whether a command line passes the security policy.
    pub fn is_allowed(&self, command_line: &str) -> bool {
        let line = command_line.trim();
        if line.is_empty() || line.contains(SHELL_METACHARACTERS) || line.contains("..") {
            return false;
        }
        self.allowed_commands.iter().any(|pattern| {
            match pattern.strip_suffix(" *") {
                Some(prefix) => {
                    line == prefix
                        || line
                            .strip_prefix(prefix)
                            .is_some_and(|rest| rest.starts_with(' '))
                }
                None => line == pattern,
            }
        })
    }

    /// Execute all markers in `content` and substitute their results.
    pub async fn process(&self, content: &str, skill_dir: &Path) -> InjectedContent {
        let mut out = String::with_capacity(content.len());
        let mut injections = Vec::new();
        let mut last = 0;

        for cap in MARKER_RE.captures_iter(content) {
            let (Some(whole), Some(body)) = (cap.get(0), cap.get(1)) else {
                continue;
            };
            let Some(marker) = InjectionMarker::parse(whole.as_str(), body.as_str()) else {
                continue;
            };
            out.push_str(&content[last..whole.start()]);
            let record = self.run_marker(&marker, skill_dir).await;
            out.push_str(&record.output);
            injections.push(record);
            last = whole.end();
        }
        out.push_str(&content[last..]);

        if !injections.is_empty() {
            tracing::debug!(
                markers = injections.len(),
                failed = injections.iter().filter(|r| !r.success).count(),
                "dynamic injection complete"
            );
        }

        InjectedContent {
            content: out,
            injections,
        }
    }

    async fn run_marker(&self, marker: &InjectionMarker, skill_dir: &Path) -> InjectionRecord {
        if !self.is_allowed(&marker.command_line) {
            tracing::warn!(
                target: "omniforge::audit",
                violation_type = "blocked_command",
                command = %marker.command_line,
                "command injection blocked by security policy"
            );
            return InjectionRecord {
                command: marker.command_line.clone(),
                success: false,
                output: format!(
                    "[Command blocked by security policy: {}]",
                    marker.command_line
                ),
            };
        }

        match self.run_command(marker, skill_dir).await {
            Ok(output) => InjectionRecord {
                command: marker.command_line.clone(),
                success: true,
                output: self.truncate(output.trim_end()),
            },
            Err(reason) => {
                tracing::debug!(command = %marker.command_line, %reason, "injected command failed");
                InjectionRecord {
                    command: marker.command_line.clone(),
                    success: false,
                    output: format!(
                        "[Command failed: {}]",
                        truncate_chars(&reason, MAX_FAILURE_REASON_CHARS)
                    ),
                }
            }
        }
    }

    async fn run_command(
        &self,
        marker: &InjectionMarker,
        skill_dir: &Path,
    ) -> std::result::Result<String, String> {
        let mut cmd = tokio::process::Command::new(&marker.program);
        cmd.args(&marker.args)
            .current_dir(skill_dir)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(e.to_string()),
            Err(_) => return Err(format!("timed out after {}ms", self.timeout.as_millis())),
        };

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_owned(), |c| c.to_string());
            Err(format!("exit code {code}: {}", stderr.trim()))
        }
    }

    fn truncate(&self, output: &str) -> String {
        let total = output.chars().count();
        if total <= self.max_output_chars {
            return output.to_owned();
        }
        let mut kept = truncate_chars(output, self.max_output_chars);
        kept.push_str(&format!(
            "\n[... output truncated: {} more characters]",
            total - self.max_output_chars
        ));
        kept
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Split a command line on whitespace, honouring single and double quotes.
fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_word = false;

    for ch in line.chars() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(ch);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_parse_splits_program_and_args() {
        let marker = InjectionMarker::parse("!`git log -n 3`", "git log -n 3").unwrap();
        assert_eq!(marker.program, "git");
        assert_eq!(marker.args, vec!["log", "-n", "3"]);
        assert!(InjectionMarker::parse("!` `", " ").is_none());
    }

    #[test]
    fn split_words_honours_quotes() {
        assert_eq!(
            split_words(r#"echo "hello world" 'a b' c"#),
            vec!["echo", "hello world", "a b", "c"]
        );
        assert_eq!(split_words(r#"echo """#), vec!["echo", ""]);
    }

    #[test]
    fn find_markers_in_content() {
        let markers = DynamicInjector::find_markers("Branch: !`git branch`\nDate: !`date`\n`plain`");
        let lines: Vec<_> = markers.iter().map(|m| m.command_line.as_str()).collect();
        assert_eq!(lines, vec!["git branch", "date"]);
    }

    #[test]
    fn allow_list_wildcard_and_exact() {
        let injector = DynamicInjector::new()
            .with_allowed_commands(vec!["date".into(), "git status *".into()]);
        assert!(injector.is_allowed("date"));
        assert!(!injector.is_allowed("date -u"));
        assert!(injector.is_allowed("git status"));
        assert!(injector.is_allowed("git status --short"));
        assert!(!injector.is_allowed("git statusx"));
        assert!(!injector.is_allowed("git push"));
    }

    #[test]
    fn metacharacters_always_blocked() {
        let injector = DynamicInjector::new().with_allowed_commands(vec!["echo *".into()]);
        assert!(injector.is_allowed("echo hi"));
        for bad in [
            "echo hi; rm -rf /",
            "echo $(id)",
            "echo hi | sh",
            "echo hi > out",
            "echo ../secret",
            "echo hi && true",
        ] {
            assert!(!injector.is_allowed(bad), "{bad}");
        }
    }

    #[test]
    fn truncate_appends_note() {
        let injector = DynamicInjector::new().with_max_output_chars(5);
        assert_eq!(injector.truncate("abc"), "abc");
        let cut = injector.truncate("abcdefgh");
        assert!(cut.starts_with("abcde\n"));
        assert!(cut.ends_with("[... output truncated: 3 more characters]"));
    }

    #[tokio::test]
    async fn blocked_marker_is_replaced_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let injector = DynamicInjector::new().with_allowed_commands(vec![]);
        let result = injector.process("Who: !`whoami` end", tmp.path()).await;
        assert_eq!(
            result.content,
            "Who: [Command blocked by security policy: whoami] end"
        );
        assert_eq!(result.injections.len(), 1);
        assert!(!result.injections[0].success);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn allowed_marker_runs_in_skill_dir() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("marker.txt"), "x").unwrap();
        let injector = DynamicInjector::new().with_allowed_commands(vec!["ls *".into()]);
        let result = injector.process("Files:\n!`ls`", tmp.path()).await;
        assert_eq!(result.content, "Files:\nmarker.txt");
        assert!(result.injections[0].success);
    }

    #[tokio::test]
    async fn missing_program_yields_failure_marker() {
        let tmp = tempfile::tempdir().unwrap();
        let injector = DynamicInjector::new()
            .with_allowed_commands(vec!["definitely-not-a-command-xyz *".into()]);
        let result = injector
            .process("!`definitely-not-a-command-xyz`", tmp.path())
            .await;
        assert!(result.content.starts_with("[Command failed: "));
        assert!(result.content.len() <= "[Command failed: ]".len() + MAX_FAILURE_REASON_CHARS * 4);
        assert!(!result.injections[0].success);
    }
}
