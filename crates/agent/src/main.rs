//! GameRig SUT agent
//!
//! The SUT-resident service that launches games, verifies their window
//! state, and answers the controller's process-management requests.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod launcher;
mod process;
mod server;
mod store;
mod window;

use config::AgentConfig;
use launcher::LaunchEngine;
use process::SystemInspector;

#[derive(Parser)]
#[command(name = "gamerigd")]
#[command(about = "GameRig SUT agent - remote game launch and window verification")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "gamerig-agent.toml")]
    config: PathBuf,

    /// HTTP listen address (overrides the config file)
    #[arg(short, long)]
    listen: Option<String>,

    /// Store client installation root (overrides the config file)
    #[arg(long)]
    store_root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("GameRig agent v{}", env!("CARGO_PKG_VERSION"));

    let mut config = AgentConfig::load(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    if let Some(store_root) = cli.store_root {
        config.store_root = Some(store_root);
    }

    let listen = config.listen.clone();
    let engine = LaunchEngine::new(config, Box::new(SystemInspector), window::platform_driver());
    let state = Arc::new(server::AppState { engine });
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    info!("agent listening on {}", listen);
    info!("endpoints: /launch /cancel_launch /kill_process /check_process /status /health");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("received shutdown signal");
        })
        .await?;

    info!("agent shutdown complete");
    Ok(())
}
