//! Background retention sweeper.
//!
//! Periodically deletes stored outputs older than the configured retention
//! window.

use std::sync::Arc;
use std::time::Duration;

use mm_pipeline::OutputStore;
use tokio_util::sync::CancellationToken;

/// Run the sweep loop until the cancellation token is triggered.
///
/// The first sweep happens immediately so files left over from a previous
/// process are reclaimed at startup.
pub async fn run_sweeper(
    store: Arc<OutputStore>,
    retention: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        "Output sweeper started (retention {}h, every {}s)",
        retention.as_secs() / 3600,
        interval.as_secs()
    );

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match store.sweep(retention).await {
            Ok(0) => tracing::debug!("Sweep found nothing to delete"),
            Ok(n) => tracing::info!("Sweep deleted {n} expired output(s)"),
            Err(e) => tracing::error!("Output sweep failed: {e}"),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => { break; }
        }
    }

    tracing::info!("Output sweeper stopped");
}
