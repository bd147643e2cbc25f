//! LiveLens demo server

use anyhow::Result;
use clap::Parser;
use livelens_server::{
    config::{self, StrategyKind},
    demo, ConnectionHub, LiveServer,
};
use livelens_core::{PerConnectionRenderer, SharedStateRenderer, Transport};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;

#[derive(Parser)]
#[command(name = "livelens")]
#[command(about = "Serve live views of in-process values", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Dispatcher strategy
    #[arg(long, value_enum)]
    strategy: Option<StrategyKind>,

    /// Directory served for unclaimed paths
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(if cli.debug { Level::DEBUG } else { Level::INFO })
        .init();

    // Load configuration, flags win
    let mut config = config::load_config(cli.config)?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(strategy) = cli.strategy {
        config.strategy = strategy;
    }
    if let Some(dir) = cli.static_dir {
        config.static_dir = Some(dir);
    }

    let hub = Arc::new(ConnectionHub::new());
    let transport: Arc<dyn Transport> = hub.clone();

    // Renderers run user code synchronously; keep them off the async workers
    match config.strategy {
        StrategyKind::Shared => {
            let renderer =
                tokio::task::spawn_blocking(move || SharedStateRenderer::new(transport, demo::client_menu)).await?;
            LiveServer::new(config, hub, Arc::new(renderer)).run().await
        }
        StrategyKind::PerConnection => {
            let renderer = PerConnectionRenderer::new(transport, demo::client_menu);
            LiveServer::new(config, hub, Arc::new(renderer)).run().await
        }
    }
}
