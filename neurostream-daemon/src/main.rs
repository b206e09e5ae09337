//! NeuroStream Daemon - EEG session streaming service
//!
//! Binds a WebSocket endpoint, spawns the stream hub, and wires it to the
//! board layer and the event store. Clients steer the session (mode,
//! context, user, recording) over the socket and receive metric broadcasts
//! back on the same connection.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use neurostream_board::{DeviceLocator, LinkSettings};
use neurostream_hub::{
    server, BoardConnector, HubConfig, SessionConnector, StreamHub, SyntheticConnector,
};
use neurostream_store::{EventStore, MemoryRemote, RemoteStore};

use crate::config::DaemonConfig;

#[derive(Parser, Debug)]
#[command(name = "neurostream-daemon", version, about = "EEG session streaming daemon")]
struct Cli {
    /// Path to config.toml (defaults to the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the WebSocket port
    #[arg(long)]
    port: Option<u16>,

    /// Use the synthetic board instead of real hardware
    #[arg(long)]
    synthetic: bool,

    /// List candidate serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if cli.list_ports {
        let ports = DeviceLocator::new().candidate_ports();
        if ports.is_empty() {
            println!("no candidate ports found");
        }
        for port in ports {
            println!("{port}");
        }
        return Ok(());
    }

    info!("Starting NeuroStream daemon v{}", env!("CARGO_PKG_VERSION"));

    let mut config = DaemonConfig::load(cli.config).context("Failed to load configuration")?;
    config.apply_env_overrides();
    if let Some(port) = cli.port {
        config.port = port;
    }
    if cli.synthetic {
        config.board.synthetic = true;
    }
    info!("Configuration loaded from {}", config.config_path.display());

    let db_path = config.event_db_path()?;
    let store = Arc::new(EventStore::open(&db_path).context("Failed to open event store")?);
    info!("Event store at {}", db_path.display());

    let remote: Option<Arc<dyn RemoteStore>> = if config.remote.enabled {
        info!("Remote replication enabled (in-process store)");
        Some(Arc::new(MemoryRemote::new()))
    } else {
        None
    };

    let connector: Arc<dyn SessionConnector> = if config.board.synthetic {
        info!("Board: synthetic signal generator");
        Arc::new(SyntheticConnector {
            min_window_samples: config.board.min_window_samples,
            ..SyntheticConnector::default()
        })
    } else {
        info!(
            "Board: serial transports at {} Hz",
            config.board.sample_rate
        );
        Arc::new(BoardConnector {
            settings: LinkSettings {
                sample_rate: config.board.sample_rate,
                ..LinkSettings::default()
            },
            builtin_radio_path: config.board.builtin_radio_path.clone(),
            min_window_samples: config.board.min_window_samples,
        })
    };

    let hub = StreamHub::spawn(
        connector,
        store,
        remote,
        HubConfig {
            poll_period: Duration::from_millis(config.board.poll_period_ms),
            default_hint: config.connection_hint(),
        },
    );

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    info!("Listening on ws://{}:{}", config.host, config.port);

    let commands = hub.commands();
    tokio::select! {
        result = server::serve(listener, commands) => {
            if let Err(e) = result {
                error!("WebSocket server error: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    hub.shutdown().await;
    info!("NeuroStream daemon stopped");
    Ok(())
}
