//! Transaction signing orchestrator daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!     dApp page ──HTTP──▶ http ──▶ session::runtime ──▶ session::machine (pure)
//!         ▲                              │    ▲
//!         │ WebSocket effects            │    │ tagged inputs
//!         └──────────────────────────────┘    │
//!                                        channels (provider, push, indexer,
//!                                                  broker, post actions)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use sign_orchestrator::channels::Collaborators;
use sign_orchestrator::config::loader::load_config;
use sign_orchestrator::lifecycle::signals::wait_for_signal;
use sign_orchestrator::observability::{logging, metrics};
use sign_orchestrator::session::MachineSettings;
use sign_orchestrator::storage::TokenStore;
use sign_orchestrator::{HttpServer, Orchestrator, Shutdown, SignerConfig};

#[derive(Parser)]
#[command(name = "sign-orchestrator")]
#[command(about = "Transaction signing orchestrator", long_about = None)]
struct Args {
    /// TOML configuration file; built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => SignerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "sign-orchestrator starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        provider = %config.provider.name,
        network_id = config.network.network_id,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let tokens = match &config.storage.token_path {
        Some(path) => TokenStore::load(path)?,
        None => TokenStore::new(None),
    };

    let collaborators = Collaborators::from_config(&config)?;
    let shutdown = Shutdown::new();

    let (handle, orchestrator) = Orchestrator::spawn(
        MachineSettings::from_config(&config),
        collaborators,
        tokens,
        shutdown.subscribe(),
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(&config, handle);
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    wait_for_signal().await;
    tracing::info!(subscribers = shutdown.receiver_count(), "Shutting down");
    shutdown.trigger();

    if let Err(e) = orchestrator.await {
        tracing::error!(error = %e, "Orchestrator task failed");
    }
    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
