//! Audio node pool daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌───────────────────────────────────────────────┐
//!                      │                 NODE REGISTRY                  │
//!   gateway packets    │  ┌──────────┐    ┌──────────────────────────┐  │
//!   ───────────────────┼─▶│  packet  │───▶│ NodeConnection (per node)│◀─┼──── backend
//!                      │  │  routes  │    │  socket · stats · state  │  │     websocket
//!                      │  └──────────┘    └────────────┬─────────────┘  │
//!                      │                               │ close          │
//!   gateway commands   │  ┌──────────┐    ┌────────────▼─────────────┐  │
//!   ◀──────────────────┼──│  player  │◀───│   failover cleaner       │  │
//!                      │  │ sessions │    │   (least penalty)        │  │
//!                      │  └──────────┘    └──────────────────────────┘  │
//!                      └───────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use audio_node_pool::config::load_config;
use audio_node_pool::lifecycle::{wait_for_signal, Shutdown};
use audio_node_pool::node::NodeEvent;
use audio_node_pool::observability::{logging, metrics};
use audio_node_pool::NodeRegistry;

#[derive(Parser, Debug)]
#[command(name = "node-pool", version, about = "Audio backend node pool")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "node-pool.toml")]
    config: PathBuf,

    /// Override the configured log level.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    let level = args
        .log_level
        .as_deref()
        .unwrap_or(config.observability.log_level.as_str());
    logging::init_logging(level);

    tracing::info!(
        config = %args.config.display(),
        nodes = config.nodes.len(),
        auto_migrate = config.failover.auto_migrate,
        "node-pool v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let (registry, mut gateway) = NodeRegistry::new(&config);
    let reconnector = registry.spawn_reconnector(shutdown.subscribe());

    let mut events = registry.subscribe();
    let mut events_shutdown = shutdown.subscribe();
    let event_log = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = events_shutdown.recv() => break,
                event = events.recv() => match event {
                    Ok(NodeEvent::Ready { node, resumed }) => {
                        tracing::info!(%node, resumed, "Node ready");
                    }
                    Ok(NodeEvent::Close { node, code, reason }) => {
                        tracing::warn!(%node, code, %reason, "Node closed");
                    }
                    Ok(NodeEvent::Error { node, error }) => {
                        tracing::error!(%node, %error, "Node error");
                    }
                    Ok(NodeEvent::Debug { node, message }) => {
                        tracing::trace!(%node, %message, "Node frame");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event log lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    });

    // Without an embedding application there is no gateway to forward to.
    let mut gateway_shutdown = shutdown.subscribe();
    let gateway_log = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = gateway_shutdown.recv() => break,
                command = gateway.recv() => match command {
                    Some(command) => tracing::info!(?command, "Gateway command"),
                    None => break,
                }
            }
        }
    });

    registry.connect_all();

    let signal = wait_for_signal().await?;
    tracing::info!(signal, "Signal received, shutting down");

    shutdown.trigger();
    registry.close_all();
    let _ = tokio::join!(reconnector, event_log, gateway_log);

    tracing::info!("Shutdown complete");
    Ok(())
}
