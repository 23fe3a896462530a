use std::sync::Arc;
use std::time::Duration;

use picsbot_contracts::cache::BlobStore;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Sweeps expired blobs every `period` for as long as the runtime lives.
pub fn spawn_reaper(cache: Arc<dyn BlobStore>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = cache.reap();
            if removed > 0 {
                info!(removed, remaining = cache.len(), "expired images reaped");
            } else {
                debug!(remaining = cache.len(), "reap found nothing expired");
            }
        }
    })
}
