//! Background TTL sweep task: a periodic `tokio::time::interval` loop with a
//! oneshot shutdown channel.

use tokio::sync::oneshot;
use tokio::time::interval;
use tracing::info;

use crate::config::RegistryConfig;
use crate::registry::Registry;

/// Spawn the periodic sweeper described in §4.2. Send on the returned sender to
/// stop it; the join handle resolves once the loop observes the shutdown signal.
pub fn spawn_sweeper(
    registry: Registry,
    config: RegistryConfig,
) -> (tokio::task::JoinHandle<()>, oneshot::Sender<()>) {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

    let handle = tokio::spawn(async move {
        let mut ticker = interval(config.cleanup_interval);
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let evicted = registry.sweep(&config);
                    if !evicted.is_empty() {
                        info!(count = evicted.len(), "sweeper evicted stale nodes");
                    }
                }
            }
        }
    });

    (handle, shutdown_tx)
}
