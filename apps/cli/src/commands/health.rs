//! `markup health`

use colored::Colorize;
use markup_cli::MarkupClient;
use markup_cli::render::format_elapsed;

pub async fn execute(client: &MarkupClient, json_output: bool) -> anyhow::Result<()> {
    let health = client.health().await?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&health)?);
        return Ok(());
    }

    let status =
        if health.status == "healthy" { health.status.green() } else { health.status.yellow() };
    println!("{} {}", "Server:".bold(), client.base_url());
    println!("  Status: {status}");
    println!("  Version: {}", health.version);
    println!("  Environment: {}", health.environment);
    println!("  Uptime: {}", format_elapsed((health.uptime_seconds * 1000.0) as u64));
    Ok(())
}
