//! Mosaic server entrypoint.

use anyhow::Context;
use mosaic_core::{FileStorage, MosaicService};
use mosaic_server::{AppState, Config, serve};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mosaic_server=info,mosaic_core=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env();

    let storage = FileStorage::new(config.data_dir.clone())
        .with_context(|| format!("opening data directory {}", config.data_dir.display()))?;
    let (service, report) = MosaicService::open(Arc::new(storage), config.guard).await?;
    if report.skipped > 0 {
        warn!("{} stored placements could not be restored", report.skipped);
    }
    if config.secret.is_none() {
        warn!("MOSAIC_SECRET is not set; deleting placements is disabled");
    }

    let addr = config.bind_address();
    info!("Data directory: {}", config.data_dir.display());
    let state = AppState::new(config, service);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Mosaic server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    serve(listener, state, shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutting down gracefully...");
}
