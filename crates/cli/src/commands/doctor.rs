//! `relaybot doctor` — Diagnose configuration and provider health.

use relaybot_config::AppConfig;
use relaybot_core::preamble::{ModelFamily, Preamble};

use super::build_provider;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 relaybot doctor");
    println!("==================\n");

    let mut issues = 0;

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            println!("\n  1 issue found. Fix the configuration and run again.");
            return Ok(());
        }
    };

    match ModelFamily::of(&config.model) {
        ModelFamily::Chat => println!("  ✅ Model {} (tools enabled)", config.model),
        ModelFamily::Reasoning => {
            println!("  ⚠️  Model {} does not support tools; reactions and file tools are disabled", config.model)
        }
    }

    match Preamble::load(config.preamble_file.as_deref()) {
        Ok(preamble) => match preamble.source() {
            Some(path) => println!("  ✅ Preamble loaded from {}", path.display()),
            None => println!("  ✅ Built-in preamble"),
        },
        Err(e) => {
            println!("  ❌ Preamble file unreadable: {e}");
            issues += 1;
        }
    }

    match config.require_discord() {
        Ok((_, channel_id)) => println!("  ✅ Discord configured for channel {channel_id}"),
        Err(e) => {
            println!("  ⚠️  {e} (needed for `relaybot serve`)");
            issues += 1;
        }
    }

    match build_provider(&config) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => println!("  ✅ Provider reachable at {}", config.api_url),
            Ok(false) => {
                println!("  ❌ Provider at {} rejected the health check", config.api_url);
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Provider unreachable: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
