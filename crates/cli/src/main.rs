//! Switchboard CLI — the main entry point.
//!
//! Commands:
//! - `chat`   — Talk to the default agent (one-shot or interactive)
//! - `daemon` — Run the full gateway: HTTP server, scheduler, delivery worker
//! - `status` — Show workspace state (sessions, jobs, queue counters)

use clap::{Parser, Subcommand};

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "switchboard",
    about = "Switchboard — an AI-agent gateway",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the default agent
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Run the full gateway process
    Daemon,

    /// Show workspace state
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Chat { message } => commands::chat::run(message).await?,
        Commands::Daemon => commands::daemon::run().await?,
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}
