use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "loom")]
#[command(version, about = "Agent-driven story workflow engine")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Auto-continue past completed steps without prompting
    #[arg(long, global = true)]
    pub yes: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a loom project in the current directory
    Init,
    /// Run the workflow with fresh guidance, or resume a paused run
    Run {
        /// Guidance for a new run; omitted when resuming
        guidance: Option<String>,
    },
    /// Show workflow, step, and story status
    Status,
    /// List the workflow steps
    Steps,
    /// List the agent roster
    Agents,
    /// Reset all run state, artifacts, and story segments
    Reset {
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "storyloom=debug" } else { "storyloom=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Init => cmd::cmd_init(&project_dir)?,
        Commands::Run { guidance } => {
            cmd::run_workflow(&cli, &project_dir, guidance.as_deref()).await?;
        }
        Commands::Status => cmd::cmd_status(&project_dir)?,
        Commands::Steps => cmd::cmd_steps(&project_dir)?,
        Commands::Agents => cmd::cmd_agents(&project_dir)?,
        Commands::Reset { force } => cmd::cmd_reset(&project_dir, *force)?,
    }

    Ok(())
}
