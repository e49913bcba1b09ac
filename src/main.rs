//! Resource router server.
//!
//! Loads the router config and a service manifest, binds every manifest
//! type, and serves until SIGINT/SIGTERM. Types bound from the manifest
//! have no handlers, so matched requests answer with the dispatch decision.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use resource_router::config::{load_config, load_manifest, RouterConfig, ServiceManifest};
use resource_router::lifecycle::{build_router, signals, Shutdown};
use resource_router::observability::{logging, metrics};
use resource_router::HttpServer;

#[derive(Parser)]
#[command(name = "resource-router", version, about = "Serve declared resources over HTTP")]
struct Args {
    /// Router configuration (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Service manifest (TOML) with `[[types]]` declarations.
    #[arg(short, long)]
    manifest: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };

    logging::init(&config.observability.log_level, config.observability.json_logs);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "resource-router starting");

    let manifest = match &args.manifest {
        Some(path) => load_manifest(path)?,
        None => {
            tracing::warn!("No manifest given, serving an empty routing table");
            ServiceManifest::default()
        }
    };

    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        cache_backend = ?config.cache.backend,
        strict_negotiation = config.negotiation.strict,
        types = manifest.types.len(),
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

    let router = build_router(&config, &manifest, Vec::new())?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));

    HttpServer::new(&config, router).run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
