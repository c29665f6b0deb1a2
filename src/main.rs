// src/main.rs

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use scorchcrawl_bridge::cli::{Cli, Commands, Transport};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env from CWD if present; never required.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("no .env file loaded: {}", e);
    }

    let cli = Cli::parse();

    // stdout is reserved for MCP stdio framing — logs always go to stderr.
    let log_level = std::env::var("SCORCHCRAWL_LOG_LEVEL")
        .ok()
        .and_then(|v| match v.to_lowercase().as_str() {
            "off" => Some(None),
            "error" => Some(Some(Level::ERROR)),
            "warn" => Some(Some(Level::WARN)),
            "info" => Some(Some(Level::INFO)),
            "debug" | "trace" => Some(Some(Level::DEBUG)),
            _ => None,
        })
        .unwrap_or(Some(Level::INFO));

    if let Some(level) = log_level {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    match cli.command.unwrap_or(Commands::Serve {
        transport: Transport::Stdio,
        bind: None,
    }) {
        Commands::Serve { transport, bind } => {
            scorchcrawl_bridge::cli::run_serve(transport, bind).await?;
        }
    }

    Ok(())
}
