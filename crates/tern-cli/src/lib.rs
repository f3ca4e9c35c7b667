//! tern CLI - command-line interface for the tern coding assistant.

mod approval;
mod cli_args;
mod commands;
mod completion;
mod display;
mod interactive;
mod task_execution;
mod ui_writer_impl;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use tern_config::Config;
use tern_core::{Agent, AutoApprove};

pub use cli_args::Cli;
use clap::Parser;

use approval::ConsoleApprover;
use interactive::run_interactive;
use task_execution::execute_turn;
use ui_writer_impl::ConsoleUiWriter;

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    initialize_logging(&cli);

    let workspace_dir = determine_workspace_dir(&cli)?;
    std::env::set_current_dir(&workspace_dir)
        .with_context(|| format!("Cannot enter workspace {}", workspace_dir.display()))?;

    let config_path = Config::resolve_path(cli.config.as_deref());
    let config = load_config_with_cli_overrides(&cli)?;
    debug!("Configuration loaded from {}", config_path.display());

    let ui_writer = if config.agent.enable_streaming {
        ConsoleUiWriter::new()
    } else {
        ConsoleUiWriter::with_markdown()
    };

    let agent = Agent::new(config, ui_writer, workspace_dir.clone())?;
    let mut agent = if cli.yes {
        agent.with_approver(Arc::new(AutoApprove))
    } else {
        agent.with_approver(Arc::new(ConsoleApprover::new()))
    };

    match cli.task {
        Some(task) => {
            if execute_turn(&mut agent, &task, Vec::new()).await.is_err() {
                // Already reported by execute_turn
                std::process::exit(1);
            }
            Ok(())
        }
        None => run_interactive(agent, &workspace_dir, &config_path).await,
    }
}

// --- Helper functions ---

fn initialize_logging(cli: &Cli) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,{pkg}={lvl},tern_cli={lvl},tern_core={lvl},tern_config={lvl},tern_providers={lvl},tern_execution={lvl},tern_computer_control={lvl}",
            pkg = env!("CARGO_PKG_NAME").replace('-', "_"),
            lvl = default_level
        ))
    });

    // Diagnostics go to stderr so they never mix with response text
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

fn determine_workspace_dir(cli: &Cli) -> Result<PathBuf> {
    let dir = match &cli.workspace {
        Some(ws) => PathBuf::from(shellexpand::tilde(&ws.to_string_lossy()).as_ref()),
        None => std::env::current_dir()?,
    };
    if !dir.is_dir() {
        anyhow::bail!("Workspace {} is not a directory", dir.display());
    }
    Ok(dir.canonicalize()?)
}

fn load_config_with_cli_overrides(cli: &Cli) -> Result<Config> {
    let mut config = Config::load_with_overrides(cli.config.as_deref(), cli.provider.clone(), cli.model.clone())?;

    if cli.no_stream {
        config.agent.enable_streaming = false;
    }
    if cli.yes {
        config.agent.confirm_side_effects = false;
    }
    if let Some(max) = cli.max_iterations {
        config.agent.max_iterations = max;
    }
    Ok(config)
}
