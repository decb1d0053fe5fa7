//! Show (and optionally persist) the effective configuration.

use livemix_common::config::AppConfig;

pub fn run(config: &AppConfig, save: bool) -> anyhow::Result<()> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration is invalid: {e}"))?;

    println!("Config file: {}", AppConfig::path().display());
    println!("{}", serde_json::to_string_pretty(config)?);

    if save {
        config.save()?;
        println!();
        println!("Saved to {}", AppConfig::path().display());
    }
    Ok(())
}
