//! Jarvis CLI - chat with a local inference server from the terminal.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod history;
mod render;

use commands::ConnectionArgs;

/// Jarvis - a streaming chat client for local LLM servers
#[derive(Parser)]
#[command(name = "jarvis")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat,

    /// Send a single prompt and stream the reply
    Ask {
        /// Prompt text
        prompt: String,
        /// Prior conversation (JSON array of {"role", "text"} turns)
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// List the models the server offers
    Models,

    /// Show the effective configuration
    Info,
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let (server, config) = cli.connection.resolve();

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| miette::miette!("Failed to start async runtime: {}", e))?;

    match cli.command {
        Commands::Chat => runtime.block_on(commands::chat::run(server, config)),
        Commands::Ask { prompt, history } => {
            runtime.block_on(commands::ask::run(server, config, &prompt, history.as_deref()))
        }
        Commands::Models => runtime.block_on(commands::models::run(server, config)),
        Commands::Info => commands::info::run(&server, &config),
    }
}
