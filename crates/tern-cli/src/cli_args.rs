//! CLI argument parsing for tern.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Clone, Debug)]
#[command(name = "tern")]
#[command(about = "An agentic coding assistant for your terminal")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Workspace directory (defaults to current directory)
    #[arg(short, long)]
    pub workspace: Option<PathBuf>,

    /// Task to execute (if provided, runs one exchange instead of the interactive prompt)
    pub task: Option<String>,

    /// Override the configured provider ('anthropic' or 'openai')
    #[arg(long, value_name = "PROVIDER")]
    pub provider: Option<String>,

    /// Override the model for the selected provider
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Wait for complete responses instead of streaming them
    #[arg(long)]
    pub no_stream: bool,

    /// Run side-effecting tools without asking for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Maximum model calls per exchange
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub max_iterations: Option<u32>,
}
