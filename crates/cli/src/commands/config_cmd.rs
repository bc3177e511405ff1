//! `relaybot config` — Configuration management commands.

use relaybot_config::AppConfig;

const REDACTED: &str = "[REDACTED]";

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();

            if !config.has_api_key() {
                warnings.push("No API key set (set OPENAI_API_KEY)");
            }
            if config.require_discord().is_err() {
                warnings.push("Discord not configured (set DISCORD_BOT_TOKEN and DISCORD_CHANNEL_ID)");
            }
            if config.discord.relay_secret.is_none() {
                warnings.push("No relay secret, inbound events are accepted unsigned");
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Model:        {}", config.model);
            println!("   API:          {}", config.api_url);
            println!("   History:      {} messages", config.history.buffer_size);
            println!("   Tool rounds:  {}", config.history.max_tool_rounds);
            println!("   File budget:  {} chars", config.attachments.char_budget);
            println!(
                "   Gateway:      {}:{}",
                config.gateway.host, config.gateway.port
            );
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&redacted(config))?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    print!("{}", AppConfig::default_toml());
    Ok(())
}

/// Mask every secret before printing.
fn redacted(mut config: AppConfig) -> AppConfig {
    let mask = |secret: &mut Option<String>| {
        if secret.is_some() {
            *secret = Some(REDACTED.into());
        }
    };
    mask(&mut config.api_key);
    mask(&mut config.discord.bot_token);
    mask(&mut config.discord.relay_secret);
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_masked() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-live".into());
        config.discord.bot_token = Some("bot-token".into());
        config.discord.channel_id = Some(42);

        let shown = toml::to_string_pretty(&redacted(config)).unwrap();
        assert!(!shown.contains("sk-live"));
        assert!(!shown.contains("bot-token"));
        assert!(shown.contains(REDACTED));
        assert!(shown.contains("42"));
    }
}
