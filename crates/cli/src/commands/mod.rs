//! Subcommand implementations and the wiring they share.

pub mod chat;
pub mod config_cmd;
pub mod doctor;
pub mod serve;

use relaybot_agent::{DispatcherConfig, Orchestrator};
use relaybot_config::AppConfig;
use relaybot_core::event::EventBus;
use relaybot_core::preamble::Preamble;
use relaybot_core::provider::Provider;
use relaybot_providers::OpenAiCompatProvider;
use std::sync::Arc;

/// Build the completion provider. Fails without an API key.
pub(crate) fn build_provider(config: &AppConfig) -> Result<Arc<dyn Provider>, Box<dyn std::error::Error>> {
    let api_key = config.require_api_key()?;
    let provider = OpenAiCompatProvider::new("openai", &config.api_url, api_key)?;
    Ok(Arc::new(provider))
}

/// Build the orchestrator: provider, built-in tools and preamble.
pub(crate) fn build_orchestrator(
    config: &AppConfig,
    event_bus: Arc<EventBus>,
) -> Result<Orchestrator, Box<dyn std::error::Error>> {
    let provider = build_provider(config)?;
    let preamble = Preamble::load(config.preamble_file.as_deref()).map_err(|e| {
        format!(
            "Failed to read preamble file {}: {e}",
            config
                .preamble_file
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        )
    })?;
    let tools = Arc::new(relaybot_tools::default_registry());

    Ok(Orchestrator::new(provider, &config.model, tools, event_bus)
        .with_preamble(preamble)
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens)
        .with_max_rounds(config.history.max_tool_rounds))
}

pub(crate) fn dispatcher_config(config: &AppConfig) -> DispatcherConfig {
    DispatcherConfig {
        queue_capacity: config.history.queue_capacity,
        history_window: config.history.buffer_size,
        char_budget: config.attachments.char_budget,
        ..DispatcherConfig::default()
    }
}
