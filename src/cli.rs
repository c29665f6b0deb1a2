// src/cli.rs
// Command-line entry point and MCP server bootstrap.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use crate::admission::RateLimitGuard;
use crate::agent::AgentJobEngine;
use crate::config::EnvConfig;
use crate::http::create_shared_client;
use crate::mcp::BridgeServer;
use crate::scrape::ScrapeEngineClient;

#[derive(Parser, Debug)]
#[command(name = "scorchcrawl-bridge", about = "MCP bridge to ScorchCrawl")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the MCP server (default command).
    Serve {
        #[arg(long, value_enum, default_value_t = Transport::Stdio)]
        transport: Transport,

        /// Address to bind when `--transport http` is used.
        #[arg(long)]
        bind: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    Stdio,
    Http,
}

/// Build the shared server state and run it to completion.
pub async fn run_serve(transport: Transport, bind: Option<String>) -> Result<()> {
    let env_config = EnvConfig::load();
    for warning in env_config.validate().warnings {
        tracing::warn!("{}", warning);
    }

    let http_client = create_shared_client();
    let scrape_client = ScrapeEngineClient::new(http_client.clone(), env_config.scrape.clone());
    let guard = RateLimitGuard::new(env_config.rate_limit.clone());
    guard.clone().spawn_gc_task();

    let engine = AgentJobEngine::new(
        env_config.agent.clone(),
        guard.clone(),
        scrape_client.clone(),
        http_client.clone(),
    )
    .with_byok(env_config.byok.clone());
    engine.clone().spawn_reaper();

    let server = BridgeServer::new(guard, engine, scrape_client, env_config);

    match transport {
        Transport::Stdio => {
            info!("starting scorchcrawl-bridge over stdio");
            let transport = rmcp::transport::io::stdio();
            let service = rmcp::serve_server(server, transport).await?;
            service.waiting().await?;
        }
        Transport::Http => {
            let bind_addr = bind.unwrap_or_else(|| "127.0.0.1:8765".to_string());
            info!("starting scorchcrawl-bridge over HTTP streaming at {}", bind_addr);
            crate::mcp::serve_http(server, &bind_addr).await?;
        }
    }

    Ok(())
}
