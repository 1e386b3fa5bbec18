//! Interpreter selection by file extension.

use std::path::Path;

/// Supported hook script languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptLanguage {
    /// Shell script (`.sh`, `.bash`).
    Shell,
    /// Python script (`.py`).
    Python,
    /// JavaScript (`.js`, `.mjs`).
    JavaScript,
    /// TypeScript (`.ts`, `.mts`), run with deno.
    TypeScript,
    /// Ruby script (`.rb`).
    Ruby,
}

impl ScriptLanguage {
    /// Detect the language from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "sh" | "bash" => Some(Self::Shell),
            "py" => Some(Self::Python),
            "js" | "mjs" => Some(Self::JavaScript),
            "ts" | "mts" => Some(Self::TypeScript),
            "rb" => Some(Self::Ruby),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Interpreter binary.
    pub fn command(&self) -> &'static str {
        match self {
            Self::Shell => "bash",
            Self::Python => "python3",
            Self::JavaScript => "node",
            Self::TypeScript => "deno",
            Self::Ruby => "ruby",
        }
    }

    /// Arguments placed before the script path.
    pub fn args(&self) -> &'static [&'static str] {
        match self {
            Self::TypeScript => &["run", "--no-prompt"],
            _ => &[],
        }
    }

    /// Base image used in Docker mode.
    pub fn docker_image(&self) -> &'static str {
        match self {
            Self::Shell => "bash:5",
            Self::Python => "python:3.12-slim",
            Self::JavaScript => "node:20-slim",
            Self::TypeScript => "denoland/deno:latest",
            Self::Ruby => "ruby:3.3-slim",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_known_extensions() {
        assert_eq!(ScriptLanguage::from_extension("PY"), Some(ScriptLanguage::Python));
        assert_eq!(
            ScriptLanguage::from_path(Path::new("scripts/a.mjs")),
            Some(ScriptLanguage::JavaScript)
        );
        assert_eq!(ScriptLanguage::from_path(Path::new("scripts/Makefile")), None);
        assert_eq!(ScriptLanguage::from_extension("exe"), None);
    }

    #[test]
    fn typescript_runs_through_deno() {
        let lang = ScriptLanguage::TypeScript;
        assert_eq!(lang.command(), "deno");
        assert_eq!(lang.args(), &["run", "--no-prompt"]);
        assert_eq!(lang.docker_image(), "denoland/deno:latest");
    }
}
