//! relaybot CLI — the main entry point.
//!
//! Commands:
//! - `serve`   — Run the Discord relay and the HTTP gateway
//! - `chat`    — Talk to the bot from the terminal
//! - `config`  — Inspect and validate configuration
//! - `doctor`  — Diagnose configuration and provider reachability

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "relaybot",
    about = "relaybot — an LLM help-desk relay for Discord",
    version,
    author
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
    /// Run the Discord relay and the HTTP gateway
    Serve {
        /// Override the gateway port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with the bot in the terminal
    Chat {
        /// Directory files sent by the bot are written to
        #[arg(short, long, default_value = ".")]
        output_dir: std::path::PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Diagnose configuration and provider health
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate the effective configuration
    Validate,
    /// Print the effective configuration (secrets redacted)
    Show,
    /// Print the config file path
    Path,
    /// Print a default config file
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Chat { output_dir } => commands::chat::run(output_dir).await?,
        Commands::Config { action } => match action {
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Init => commands::config_cmd::init().await?,
        },
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
