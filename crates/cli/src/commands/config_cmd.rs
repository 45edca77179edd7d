//! `hintloop config`: Configuration management commands.

use anyhow::Context;
use hintloop_config::AppConfig;

pub fn validate() -> anyhow::Result<()> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ok: config parsed and validated");

            let mut warnings = Vec::new();
            if !config.has_api_key() && !is_local(&config.provider) {
                warnings.push(format!(
                    "No API key set for provider '{}' (set HINTLOOP_API_KEY)",
                    config.provider
                ));
            }
            if config.mcp.enabled && config.mcp.servers.is_empty() {
                warnings.push("MCP is enabled but no [[mcp.servers]] are configured".into());
            }
            for w in &warnings {
                println!("   warning: {w}");
            }

            println!();
            println!("   Provider:        {}", config.provider);
            println!("   Model:           {}", config.provider_model());
            println!("   Max iterations:  {}", config.agent.max_iterations);
            println!(
                "   Trajectory:      {}",
                if config.trajectory.enabled {
                    config.trajectory.path.display().to_string()
                } else {
                    "disabled".into()
                }
            );
            println!(
                "   Gateway:         {}:{}",
                config.gateway.host, config.gateway.port
            );
            println!("   MCP servers:     {}", config.mcp.servers.len());
        }
        Err(e) => {
            println!("   error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub fn show() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    println!("{}", render(&config)?);
    Ok(())
}

pub fn path() {
    println!("{}", AppConfig::config_path().display());
}

pub fn init() -> anyhow::Result<()> {
    let config_path = AppConfig::config_path();
    if write_default(&config_path)? {
        println!("Created {}", config_path.display());
        println!("Add your API key there, or set HINTLOOP_API_KEY.");
    } else {
        println!("Config already exists at: {}", config_path.display());
        println!("Edit it manually or delete it and re-run `hintloop config init`.");
    }
    Ok(())
}

/// Write the default configuration unless a file is already there.
fn write_default(config_path: &std::path::Path) -> anyhow::Result<bool> {
    if config_path.exists() {
        return Ok(false);
    }
    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    std::fs::write(config_path, AppConfig::default_toml())
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    Ok(true)
}

/// The configuration as TOML with every API key masked.
fn render(config: &AppConfig) -> anyhow::Result<String> {
    let mut shown = config.clone();
    let mask = |key: &mut Option<String>| {
        if key.is_some() {
            *key = Some("[REDACTED]".into());
        }
    };
    mask(&mut shown.api_key);
    for provider in shown.providers.values_mut() {
        mask(&mut provider.api_key);
    }
    Ok(toml::to_string_pretty(&shown)?)
}

fn is_local(provider: &str) -> bool {
    matches!(provider, "ollama" | "vllm" | "llamacpp" | "llama.cpp")
}
