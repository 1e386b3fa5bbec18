//! CLI entry point for OmniForge.
//!
//! This binary provides the `omniforge` command with subcommands for
//! running, inspecting and listing skills, and for running hook scripts
//! through the sandbox.

mod cli;
mod helpers;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures::StreamExt;
use omniforge_agent::{
    AnthropicConfig, AnthropicEngine, ExecutionRequest, PlatformConfig, SkillOrchestrator,
    TaskEvent, TaskState,
};
use omniforge_sandbox::ScriptExecutor;
use omniforge_skills::{
    ContextMode, ExecutionMode, FsSkillLoader, Preprocessor, SCRIPTS_DIR, SkillLoader,
    SubstitutionContext,
};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::cli::{Cli, Commands};
use crate::helpers::{init_tracing, load_config, parse_var, render_event, state_label};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let level = match cli.command {
        Commands::Run { .. } => "info",
        _ => "warn",
    };
    init_tracing(level, cli.json_logs);

    let config = load_config(cli.config.as_deref(), cli.skills_dir.as_deref())?;

    match cli.command {
        Commands::Run {
            skill,
            request,
            mode,
            context,
            task_id,
            session,
            tenant,
            vars,
            json,
        } => {
            let mut req = ExecutionRequest::new(skill, request.join(" "))
                .with_session_id(session.unwrap_or_else(|| uuid::Uuid::now_v7().to_string()));
            if let Some(id) = task_id {
                req = req.with_task_id(id);
            }
            if let Some(tenant) = tenant {
                req = req.with_tenant_id(tenant);
            }
            if let Some(mode) = mode {
                req = req.with_mode(mode.into());
            }
            if let Some(context) = context {
                req = req.with_context(context.into());
            }
            if let Ok(dir) = std::env::current_dir() {
                req = req.with_workspace(dir);
            }
            for raw in &vars {
                let (name, value) = parse_var(raw)?;
                req = req.with_var(name, value);
            }
            cmd_run(config, req, json).await
        }
        Commands::Inspect {
            skill,
            request,
            content,
        } => cmd_inspect(&config, &skill, &request.join(" "), content).await,
        Commands::List => cmd_list(&config).await,
        Commands::Script {
            skill,
            script,
            args,
        } => cmd_script(&config, &skill, &script, &args).await,
        Commands::Status => cmd_status(&config),
    }
}

// ---------------------------------------------------------------------------
// Subcommand: run
// ---------------------------------------------------------------------------

async fn cmd_run(config: PlatformConfig, request: ExecutionRequest, json: bool) -> Result<()> {
    let engine = AnthropicConfig::from_env()
        .and_then(AnthropicEngine::new)
        .context("the reasoning engine could not be configured")?;
    let loader = Arc::new(FsSkillLoader::new(config.orchestrator.skills_dir.clone()));
    let orchestrator = Arc::new(SkillOrchestrator::new(loader, Arc::new(engine), config));

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            let _ = cancel_tx.send(true);
        }
    });

    let skill = request.skill_name.clone();
    let mut stream = orchestrator
        .execute(request.with_cancel(cancel_rx))
        .await
        .with_context(|| format!("failed to start skill `{skill}`"))?;

    let mut final_state = None;
    while let Some(event) = stream.next().await {
        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else if let Some(line) = render_event(&event) {
            println!("{line}");
        }
        if let TaskEvent::Done { final_state: state } = event {
            final_state = Some(state);
        }
    }

    match final_state {
        Some(TaskState::Completed) => Ok(()),
        Some(state) => bail!("skill `{skill}` finished as {}", state_label(state)),
        None => bail!("skill `{skill}` ended without a final state"),
    }
}

// ---------------------------------------------------------------------------
// Subcommand: inspect
// ---------------------------------------------------------------------------

async fn cmd_inspect(
    config: &PlatformConfig,
    name: &str,
    request: &str,
    show_content: bool,
) -> Result<()> {
    let loader = FsSkillLoader::new(config.orchestrator.skills_dir.clone());
    let skill = loader
        .load_skill(name)
        .await
        .with_context(|| format!("failed to load skill `{name}`"))?;

    let mode = skill
        .metadata
        .execution_mode
        .as_deref()
        .and_then(ExecutionMode::parse)
        .unwrap_or(ExecutionMode::Autonomous);
    let context = skill
        .metadata
        .context
        .as_deref()
        .and_then(ContextMode::parse)
        .unwrap_or_default();

    println!();
    println!("  {} {}", skill.name, skill.version.as_deref().unwrap_or(""));
    println!("  {}", skill.description);
    println!();
    println!("  Directory:      {}", skill.skill_dir.display());
    println!("  Mode:           {mode}");
    println!("  Context:        {context:?}");
    match skill.allowed_tools() {
        Some(tools) => println!("  Allowed tools:  {}", tools.join(", ")),
        None => println!("  Allowed tools:  (unrestricted)"),
    }
    if let Some(n) = skill.metadata.max_iterations {
        println!("  Max iterations: {n}");
    }
    for script in &skill.scripts {
        println!("  Script:         {}", script.filename);
    }

    let preprocessor = Preprocessor::new(config.injection.injector());
    let prepared = preprocessor
        .prepare(&skill, &SubstitutionContext::new(request))
        .await;

    if !prepared.context.available_files.is_empty() {
        println!();
        println!("  Supporting files:");
        for (path, file) in &prepared.context.available_files {
            match file.estimated_lines {
                Some(lines) => println!("    {path} (~{lines} lines) {}", file.description),
                None => println!("    {path} {}", file.description),
            }
        }
    }
    for injection in &prepared.injections {
        let mark = if injection.success { "ok" } else { "blocked" };
        println!("  Injection:      {} [{mark}]", injection.command);
    }
    if !prepared.undefined_vars.is_empty() {
        println!("  Undefined:      {}", prepared.undefined_vars.join(", "));
    }
    println!(
        "  Content:        {} lines, {} substitutions",
        prepared.context.line_count, prepared.substitutions_made
    );

    if show_content {
        println!();
        println!("{}", prepared.context.skill_content);
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: list
// ---------------------------------------------------------------------------

async fn cmd_list(config: &PlatformConfig) -> Result<()> {
    let loader = FsSkillLoader::new(config.orchestrator.skills_dir.clone());
    let skills = loader.list_skills().await.context("failed to list skills")?;

    if skills.is_empty() {
        println!(
            "  No skills found in {}",
            config.orchestrator.skills_dir.display()
        );
        return Ok(());
    }

    let width = skills.iter().map(|s| s.name.len()).max().unwrap_or(0);
    for summary in skills {
        println!("  {:width$}  {}", summary.name, summary.description);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: script
// ---------------------------------------------------------------------------

async fn cmd_script(
    config: &PlatformConfig,
    name: &str,
    script: &str,
    args: &[String],
) -> Result<()> {
    let loader = FsSkillLoader::new(config.orchestrator.skills_dir.clone());
    let skill = loader
        .load_skill(name)
        .await
        .with_context(|| format!("failed to load skill `{name}`"))?;

    let path = skill.skill_dir.join(SCRIPTS_DIR).join(script);
    let executor = ScriptExecutor::new(config.sandbox.clone());
    info!(skill = %skill.name, script = %script, mode = ?config.sandbox.mode, "running hook script");

    let result = executor
        .execute(&path, &skill.skill_dir, args, &HashMap::new())
        .await
        .with_context(|| format!("script `{script}` could not be run"))?;

    print!("{}", result.output);
    if !result.output.ends_with('\n') && !result.output.is_empty() {
        println!();
    }
    if !result.success {
        match result.exit_code {
            Some(code) => bail!("script exited with status {code}"),
            None => bail!("script was terminated by a signal"),
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: status
// ---------------------------------------------------------------------------

fn cmd_status(config: &PlatformConfig) -> Result<()> {
    println!();
    println!("  OmniForge Status");
    println!("  ================");
    println!();

    let skills_dir = &config.orchestrator.skills_dir;
    if skills_dir.is_dir() {
        println!("  Skills directory: OK ({})", skills_dir.display());
    } else {
        println!("  Skills directory: MISSING ({})", skills_dir.display());
    }

    match std::env::var(omniforge_agent::llm::anthropic::API_KEY_ENV) {
        Ok(_) => println!("  Anthropic API:    CONFIGURED"),
        Err(_) => println!("  Anthropic API:    NOT SET"),
    }

    println!("  Model:            {}", config.autonomous.model);
    println!("  Max iterations:   {}", config.autonomous.max_iterations);
    println!("  Max depth:        {}", config.orchestrator.max_depth);
    println!("  Sandbox:          {:?}", config.sandbox.mode);
    println!();

    Ok(())
}
