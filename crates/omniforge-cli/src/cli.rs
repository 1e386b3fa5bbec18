//! CLI argument definitions for OmniForge.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use omniforge_skills::{ContextMode, ExecutionMode};

/// OmniForge -- run SKILL.md skills with a reasoning engine.
#[derive(Parser)]
#[command(
    name = "omniforge",
    version,
    about = "OmniForge -- skill execution engine",
    long_about = "Loads SKILL.md skills, prepares their content and runs them either as a \
                  single reasoning call or as an autonomous tool-calling loop."
)]
pub struct Cli {
    /// Configuration file (TOML or JSON).  Defaults to `$OMNIFORGE_CONFIG`
    /// or `config/omniforge.toml`.
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Skills directory, overriding the configuration.
    #[arg(long, global = true)]
    pub skills_dir: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a skill and stream its progress.
    Run {
        /// Skill name.
        skill: String,

        /// The user request passed to the skill.
        #[arg(trailing_var_arg = true)]
        request: Vec<String>,

        /// Override the skill's execution mode.
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Override the skill's context mode.
        #[arg(long, value_enum)]
        context: Option<ContextArg>,

        /// Task identifier.  Generated when omitted.
        #[arg(long)]
        task_id: Option<String>,

        /// Session identifier exposed as `${SESSION_ID}`.
        #[arg(long, short)]
        session: Option<String>,

        /// Tenant identifier exposed as `${TENANT_ID}`.
        #[arg(long)]
        tenant: Option<String>,

        /// Extra substitution variables, `NAME=VALUE`.
        #[arg(long = "var", value_name = "NAME=VALUE")]
        vars: Vec<String>,

        /// Print every event as a JSON line instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Show a skill's metadata and its prepared content.
    Inspect {
        /// Skill name.
        skill: String,

        /// Arguments used for substitution.
        #[arg(trailing_var_arg = true)]
        request: Vec<String>,

        /// Print the prepared content in full.
        #[arg(long)]
        content: bool,
    },

    /// List available skills.
    List,

    /// Run one of a skill's hook scripts through the sandbox.
    Script {
        /// Skill name.
        skill: String,

        /// Script file name under the skill's `scripts/` directory.
        script: String,

        /// Arguments passed to the script.
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },

    /// Show the effective configuration and environment.
    Status,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Simple,
    Autonomous,
}

impl From<ModeArg> for ExecutionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Simple => Self::Simple,
            ModeArg::Autonomous => Self::Autonomous,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ContextArg {
    Inherit,
    Fork,
}

impl From<ContextArg> for ContextMode {
    fn from(context: ContextArg) -> Self {
        match context {
            ContextArg::Inherit => Self::Inherit,
            ContextArg::Fork => Self::Fork,
        }
    }
}
