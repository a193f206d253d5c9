//! Markup Server - Entry Point
//!
//! This binary starts the markup HTTP server.

use anyhow::Context;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use markup_core::config::{Config, LogFormat};
use markup_core::server;

fn init_tracing(format: LogFormat) {
    let json = format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "markup_core=debug,info".into()))
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    init_tracing(config.as_ref().map_or(LogFormat::Text, |c| c.server.log_format));

    let config = config.context("Failed to load configuration")?;
    server::run(config).await.context("Server error")?;
    Ok(())
}
