/// Configuration command handlers
use anyhow::Result;
use helmsman_core::{config_path, HelmsmanConfig};

pub fn show_command() -> Result<()> {
    let config = HelmsmanConfig::load()?;

    println!("[timing]");
    println!(
        "  visibility_grace_secs = {}",
        config.timing.visibility_grace_secs
    );
    println!("  idle_threshold_secs = {}", config.timing.idle_threshold_secs);
    println!(
        "  heartbeat_interval_secs = {}",
        config.timing.heartbeat_interval_secs
    );
    println!(
        "  sustained_drift_secs = {}",
        config.timing.sustained_drift_secs
    );

    println!("\n[dialogue]");
    println!("  auto_restart = {}", config.dialogue.auto_restart);
    println!("  settle_delay_ms = {}", config.dialogue.settle_delay_ms);
    println!(
        "  inactivity_ceiling_secs = {}",
        config.dialogue.inactivity_ceiling_secs
    );
    println!("  retry_delay_ms = {}", config.dialogue.retry_delay_ms);

    println!("\n[rules]");
    println!("  blacklist = {:?}", config.rules.blacklist);
    println!("  productivity = {:?}", config.rules.productivity);

    println!("\n[services]");
    println!("  base_url = {}", config.services.base_url);
    let key = config.services.effective_api_key();
    if key.is_empty() {
        println!("  api_key = (unset)");
    } else {
        println!(
            "  api_key = {}***",
            key.chars().take(8).collect::<String>()
        );
    }
    println!("  voice = {}", config.services.voice);

    Ok(())
}

pub fn path_command() -> Result<()> {
    println!("{}", config_path()?.display());
    Ok(())
}
