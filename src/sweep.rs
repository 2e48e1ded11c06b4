//! Background staleness sweep.

use crate::registry::Registry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const SWEEP_INTERVAL: Duration = Duration::from_millis(500);

/// Periodically evicts registry entries whose telemetry has gone quiet.
/// Eviction only drops the telemetry view; open sockets keep their outbound
/// channel until the connection handler tears it down.
pub async fn run(registry: Arc<Registry>, cancel: CancellationToken) {
    let mut ticker = interval(SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                for ip in registry.evict_stale(Instant::now()) {
                    warn!(%ip, "evicted stale wearable");
                }
            }
        }
    }
    info!("staleness sweep stopped");
}
