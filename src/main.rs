//! Front door router (v1)
//!
//! The single HTTP entry point of the control plane, built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────────┐
//!                      │                       FRONT DOOR                          │
//!                      │                                                           │
//!   Client Request     │  ┌─────────┐    ┌─────────┐    ┌──────────────────────┐   │
//!   ───────────────────┼─▶│   net   │───▶│  http   │───▶│  outer route table   │   │
//!                      │  │listener │    │ server  │    │ public/whitelist/gate│   │
//!                      │  └─────────┘    └─────────┘    └──────────┬───────────┘   │
//!                      │                                           │               │
//!                      │            ┌──────────────┬───────────────┼────────┐      │
//!                      │            ▼              ▼               ▼        ▼      │
//!                      │     ┌────────────┐ ┌────────────┐ ┌───────────┐ ┌──────┐ │
//!                      │     │ middleware │ │   tunnel   │ │ auth gate │ │  ui  │ │
//!                      │     │   chains   │ │ dispatcher │ │ + audit   │ │      │ │
//!                      │     └─────┬──────┘ └────────────┘ └─────┬─────┘ └──────┘ │
//!                      │           │                             ▼               │
//!                      │           │                    ┌─────────────────┐      │
//!                      │           └───────────────────▶│  collaborators  │──────┼──▶ Upstreams
//!                      │                                │ (proxy/, ui/)   │      │
//!                      │                                └─────────────────┘      │
//!                      │                                                           │
//!                      │  Cross-cutting: config, observability, lifecycle          │
//!                      └──────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use front_door::config::{load_config, RouterConfig};
use front_door::lifecycle::{signals, startup, Shutdown};
use front_door::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "front-door")]
#[command(about = "Front door HTTP router for the cluster-management control plane", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the plaintext listener address
    #[arg(long)]
    http_address: Option<String>,

    /// Override the TLS listener address
    #[arg(long)]
    https_address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };
    if let Some(addr) = cli.http_address {
        config.listener.http_address = addr;
    }
    if let Some(addr) = cli.https_address {
        config.listener.https_address = addr;
    }

    logging::init_logging(&config.observability);
    tracing::info!("front-door v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        http_address = %config.listener.http_address,
        tls = config.listener.tls.is_some(),
        tunnel = config.tunnel.enabled,
        request_timeout_secs = config.timeouts.request_secs,
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

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    startup::start(config, cli.config.as_deref(), &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
