//! mm-server: HTTP API server and background output sweeper.
//!
//! This crate ties the other mm-* crates into a running server application.
//! It provides:
//!
//! - Axum-based HTTP API for uploading, combining, listing and downloading
//! - Multipart intake that stages uploads on disk
//! - Background sweeper enforcing the output retention window
//! - Graceful shutdown via signal handling

pub mod context;
pub mod error;
pub mod intake;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod sweeper;

use std::net::SocketAddr;

use mm_core::config::Config;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use crate::context::AppContext;
pub use crate::router::build_router;

/// Start the mediamix server.
///
/// Prepares the storage directories, discovers ffmpeg/ffprobe, constructs the
/// [`AppContext`] and serves HTTP until a shutdown signal arrives.
pub async fn start(config: Config) -> mm_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    config.storage.ensure_dirs()?;
    tracing::info!(
        "Storage ready (uploads {}, temp {}, output {})",
        config.storage.upload_dir.display(),
        config.storage.temp_dir.display(),
        config.storage.output_dir.display()
    );

    // Discover external tools.
    let tools = mm_av::ToolRegistry::discover(&config.tools);
    for info in tools.check_all().await {
        if info.available {
            tracing::info!(
                "Tool found: {} ({})",
                info.name,
                info.version.as_deref().unwrap_or("unknown version")
            );
        } else {
            tracing::warn!("Tool not found: {}", info.name);
        }
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| mm_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let ctx = AppContext::new(config, tools);

    // Spawn the retention sweeper.
    let sweeper_handle = if ctx.config.storage.sweep_interval_secs > 0 {
        let store = ctx.store.clone();
        let retention = ctx.config.storage.retention();
        let interval = std::time::Duration::from_secs(ctx.config.storage.sweep_interval_secs);
        let cancel = ctx.shutdown.clone();
        Some(tokio::spawn(sweeper::run_sweeper(
            store, retention, interval, cancel,
        )))
    } else {
        tracing::info!("Output sweeper disabled");
        None
    };

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| mm_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;
    tracing::info!("Starting server on {addr}");

    serve(listener, ctx).await?;

    if let Some(handle) = sweeper_handle {
        let _ = handle.await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Serve the router on an already bound listener until shutdown.
///
/// Cancels `ctx.shutdown` on the way out so in-flight runs and background
/// tasks stop as well.
pub async fn serve(listener: TcpListener, ctx: AppContext) -> mm_core::Result<()> {
    let cancel = ctx.shutdown.clone();
    let app = build_router(ctx);

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await;

    cancel.cancel();
    result.map_err(|e| mm_core::Error::Internal(format!("Server error: {e}")))
}

/// Wait for a shutdown signal (SIGINT or SIGTERM) or cancellation.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
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
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}
