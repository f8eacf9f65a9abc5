//! Dynamic reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     snapshot document ──▶ source (notify) ──▶ reload coalescer ──▶ RoutingTable::build
//!                                                                          │
//!                                                                   ArcSwap::store
//!                                                                          │
//!     Client ──▶ net listener ──┬── :80  http ──────────┐                  ▼
//!                               └── :443 tls (SNI) ─────┴──▶ proxy_handler ──▶ upstream
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use ingress_proxy::config::{load_config, validation::validate_config, ConfigError, ProxyConfig};
use ingress_proxy::lifecycle::{signals, Shutdown};
use ingress_proxy::observability::{logging, metrics};
use ingress_proxy::routing::ConfigSnapshot;
use ingress_proxy::source::FileSource;
use ingress_proxy::ProxyServer;

#[derive(Parser)]
#[command(name = "ingress-proxy")]
#[command(about = "Reverse proxy driven by routing snapshots", long_about = None)]
struct Cli {
    /// Proxy configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Plain HTTP port
    #[arg(long)]
    port: Option<u16>,

    /// HTTPS port
    #[arg(long)]
    tls_port: Option<u16>,

    /// Snapshot document with routes, TLS bindings and secrets
    #[arg(short, long)]
    snapshot: Option<PathBuf>,
}

impl Cli {
    fn load(&self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ProxyConfig::default(),
        };

        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(port) = self.tls_port {
            config.listener.tls_port = port;
        }
        if let Some(path) = &self.snapshot {
            config.reload.snapshot_path = Some(path.display().to_string());
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.load()?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!("ingress-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        port = config.listener.port,
        tls_port = config.listener.tls_port,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let server = Arc::new(ProxyServer::new(&config));

    let source = match &config.reload.snapshot_path {
        Some(path) => Some(FileSource::spawn(
            &PathBuf::from(path),
            config.reload.debounce(),
            shutdown.subscribe(),
            server.clone(),
        )?),
        None => {
            tracing::warn!("No snapshot configured, serving with an empty routing table");
            server.update(&ConfigSnapshot::default());
            None
        }
    };

    let result = server.run(shutdown.subscribe()).await;

    // A listener failure must also stop the reload loop.
    shutdown.trigger();
    if let Some(source) = source {
        source.join().await;
    }

    result?;
    tracing::info!("Shutdown complete");
    Ok(())
}
