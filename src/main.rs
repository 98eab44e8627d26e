//! ScanGate - JSON-RPC gateway fronting a remote threat-scanning service.
//!
//! The composition root: every component is constructed here and handed
//! to its collaborators explicitly. Nothing reaches through a global.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use scangate::catalog::{PromptCatalog, ResourceCatalog, ToolCatalog};
use scangate::config::GatewayConfig;
use scangate::transport::server::{GatewayState, build_router};
use scangate::transport::{NeverStream, ProtocolRouter, SessionManager, SseBroadcaster};
use scangate::upstream::{RateLimiter, ResponseCache, ScanApiClient, ScanService};

/// Command-line overrides for the HTTP listener.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Listen address; overrides SCANGATE_LISTEN when set
    #[arg(short, long, env = "SCANGATE_LISTEN")]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = GatewayConfig::from_env().map_err(|e| {
        error!(error = %e, "Configuration error");
        e
    })?;
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }

    // Composition root: build every collaborator once, inject by Arc.
    let cache = Arc::new(ResponseCache::new(config.cache.clone()));
    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
    let client = ScanApiClient::new(config.upstream.clone())?;
    let service = Arc::new(ScanService::new(
        Arc::new(client),
        cache.clone(),
        limiter.clone(),
    ));
    let sessions = Arc::new(SessionManager::new());
    let broadcaster = Arc::new(SseBroadcaster::new());
    let router = ProtocolRouter::new(
        ToolCatalog::new(service),
        ResourceCatalog::new(cache.clone(), limiter.clone()),
        PromptCatalog::new(),
        sessions.clone(),
        broadcaster.clone(),
        Arc::new(NeverStream),
    );
    let state = Arc::new(GatewayState::new(
        router,
        sessions,
        broadcaster.clone(),
        &config.server,
    ));

    // Background sweeps stop on the shutdown token.
    let shutdown = CancellationToken::new();
    cache.spawn_sweep_task(shutdown.clone());
    limiter.spawn_cleanup_task(shutdown.clone());

    let app = build_router(state);
    let listener = TcpListener::bind(&config.server.listen_addr).await?;
    info!(
        listen = %config.server.listen_addr,
        upstream = %config.upstream.base_url,
        "ScanGate starting"
    );

    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signal_token.cancel();
        })
        .await?;

    broadcaster.close_all();
    info!("ScanGate stopped");
    Ok(())
}

/// Resolves when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, initiating graceful shutdown"),
            Err(e) => error!(error = %e, "Failed to listen for SIGINT"),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM, initiating graceful shutdown");
            }
            Err(e) => error!(error = %e, "Failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
