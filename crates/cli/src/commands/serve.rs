//! `relaybot serve` — Run the Discord relay and the HTTP gateway.

use relaybot_agent::{AddressPolicy, Dispatcher, spawn_supervisor};
use relaybot_channels::{DiscordChannel, DiscordConfig, HttpFetcher};
use relaybot_config::AppConfig;
use relaybot_core::channel::Channel;
use relaybot_core::event::EventBus;
use relaybot_gateway::GatewayState;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{build_orchestrator, dispatcher_config};

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let (bot_token, channel_id) = config.require_discord()?;
    let mut discord_config = DiscordConfig::new(bot_token, channel_id);
    discord_config.bot_user_id = config.discord.bot_user_id.clone();
    discord_config.relay_secret = config.discord.relay_secret.clone();
    if discord_config.relay_secret.is_none() {
        warn!("DISCORD_RELAY_SECRET is not set, relayed events are accepted unsigned");
    }
    let discord = Arc::new(DiscordChannel::new(discord_config)?);

    let event_bus = Arc::new(EventBus::default());
    let supervisor = spawn_supervisor(&event_bus);
    let orchestrator = Arc::new(build_orchestrator(&config, event_bus.clone())?);

    let bot_user_id = discord.bot_user_id().await;
    if bot_user_id.is_none() {
        warn!("Bot user ID unknown, posts that mention anyone will be ignored");
    }

    let shutdown = CancellationToken::new();
    let inbound = discord.start().await?;
    let dispatcher = Dispatcher::new(
        orchestrator,
        discord.clone(),
        Arc::new(HttpFetcher::for_char_budget(config.attachments.char_budget)),
        event_bus.clone(),
    )
    .with_config(dispatcher_config(&config))
    .with_policy(AddressPolicy::new(channel_id.to_string(), bot_user_id))
    .with_cancellation(shutdown.child_token());
    let dispatch_task = tokio::spawn(dispatcher.run(inbound));

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = Arc::new(GatewayState::new(config.model.clone(), Some(discord.clone())));

    println!("🤖 relaybot");
    println!("   Model:     {}", config.model);
    println!("   Channel:   {channel_id}");
    println!("   Gateway:   {addr}");

    let gateway_shutdown = shutdown.clone();
    let mut gateway =
        tokio::spawn(async move { relaybot_gateway::serve(&addr, state, gateway_shutdown).await });

    let finished = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutdown requested");
            None
        }
        result = &mut gateway => Some(result?),
    };

    shutdown.cancel();
    let gateway_result = match finished {
        Some(result) => result,
        None => gateway.await?,
    };
    discord.stop().await?;
    dispatch_task.await?;
    supervisor.abort();

    gateway_result?;
    Ok(())
}
