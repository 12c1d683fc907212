use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::registry::PeerRegistry;

/// Evict stale peers every `interval` until `shutdown` fires
pub async fn run_reaper(registry: Arc<PeerRegistry>, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => registry.evict_stale(Instant::now()),
        }
    }
}
