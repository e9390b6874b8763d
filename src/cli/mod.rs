//! CLI module: command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod agent;
pub mod common;
pub mod config;
pub mod memory;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "nanoclaw")]
#[command(version)]
#[command(about = "Lightweight personal AI agent runtime", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent (interactive unless -m is given)
    Agent {
        /// Process a single message and exit
        #[arg(short, long)]
        message: Option<String>,
        /// Session key to use (default "cli:direct")
        #[arg(long, default_value = "cli:direct")]
        session: String,
    },
    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Inspect long-term memory files
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration (secrets masked)
    Show,
    /// Write a default config file and create the workspace
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum MemoryAction {
    /// Print MEMORY.md
    Show,
    /// Print the last entries of HISTORY.md
    History {
        /// Number of entries to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

/// Entry point for the CLI, called from main().
pub async fn run() -> Result<()> {
    // Load config early so logging respects it; fall back to defaults if the
    // file is missing or unreadable.
    let logging_cfg = nanoclaw::config::Config::load()
        .map(|c| c.logging)
        .unwrap_or_default();
    nanoclaw::utils::logging::init_logging(&logging_cfg);

    let cli = Cli::parse();

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Agent { message, session }) => {
            agent::cmd_agent(message, session).await?;
        }
        Some(Commands::Config { action }) => {
            config::cmd_config(action).await?;
        }
        Some(Commands::Memory { action }) => {
            memory::cmd_memory(action).await?;
        }
        Some(Commands::Version) => {
            println!("nanoclaw {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
