//! `hintloop serve`: Start the HTTP gateway.

use anyhow::Context;
use hintloop_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> anyhow::Result<()> {
    let mut config = AppConfig::load().context("Failed to load config")?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("hintloop gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Provider:  {} ({})", config.provider, config.provider_model());
    println!("   MCP:       {}", if config.mcp.enabled { "enabled" } else { "disabled" });

    hintloop_gateway::start(config)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    Ok(())
}
