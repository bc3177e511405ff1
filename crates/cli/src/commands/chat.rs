//! `relaybot chat` — Talk to the bot from the terminal.
//!
//! Uses the same dispatcher as `serve`, with stdin/stdout standing in for
//! Discord. Files the bot sends land in the output directory.

use relaybot_agent::{AddressPolicy, Dispatcher, spawn_supervisor};
use relaybot_channels::{CliChannel, HttpFetcher};
use relaybot_config::AppConfig;
use relaybot_core::channel::Channel;
use relaybot_core::event::EventBus;
use std::path::PathBuf;
use std::sync::Arc;

use super::{build_orchestrator, dispatcher_config};

pub async fn run(output_dir: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set the environment variable:");
        eprintln!("    OPENAI_API_KEY=sk-...");
        eprintln!();
        eprintln!("  Or add api_key to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let event_bus = Arc::new(EventBus::default());
    let supervisor = spawn_supervisor(&event_bus);
    let orchestrator = Arc::new(build_orchestrator(&config, event_bus.clone())?);

    let channel = Arc::new(CliChannel::with_output_dir(&output_dir));
    let inbound = channel.start().await?;

    println!();
    println!("  relaybot — interactive chat");
    println!("  Model:   {}", config.model);
    println!("  Files:   {}", output_dir.display());
    println!("  Type 'exit' or press Ctrl+D to quit.");
    println!();

    let fetcher = Arc::new(HttpFetcher::for_char_budget(config.attachments.char_budget));
    Dispatcher::new(orchestrator, channel, fetcher, event_bus)
        .with_config(dispatcher_config(&config))
        .with_policy(AddressPolicy::open())
        .run(inbound)
        .await;

    supervisor.abort();
    println!("  Goodbye!");
    Ok(())
}
