//! CLI `config show`: print the effective configuration.

use anyhow::{Context, Result};

use crate::config::AppConfig;

/// Print the effective config as TOML (API key masked) and the namespace new
/// writes go to.
pub fn show_config(config: &AppConfig) -> Result<()> {
    let mut shown = config.clone();
    shown.embedder = shown.embedder.redacted();
    let rendered = toml::to_string_pretty(&shown).context("failed to render config")?;

    println!("# {}", config.paths.config_path);
    println!("{rendered}");
    println!("namespace = {:?}", config.embedder.namespace());
    if config.embedder.dim == 0 {
        println!("# dimension not learned yet; it is recorded after the first embedding");
    }
    Ok(())
}
