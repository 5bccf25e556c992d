pub mod backoff;

use tokio::sync::watch;

/// Resolves once the shutdown flag is set or its sender is gone.
pub async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}
