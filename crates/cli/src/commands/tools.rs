//! `hintloop tools`: List the tools declared to the model.

use anyhow::Context;
use hintloop_config::AppConfig;

pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let toolset = hintloop_tools::build_toolset(&config).await?;

    println!("{} tools available:", toolset.registry.len());
    println!();
    for def in toolset.registry.describe_all() {
        let origin = if toolset.mcp_tools.contains(&def.name) { " [mcp]" } else { "" };
        println!("  {}{origin}", def.name);
        if let Some(first) = def.description.lines().next() {
            println!("      {first}");
        }
    }

    Ok(())
}
