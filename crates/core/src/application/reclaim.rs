// Reclaim Sweeper - returns stuck active items to the waiting state
//
// An item claimed by a worker that crashed (or lost its store connection)
// would otherwise stay active forever. The sweeper periodically releases
// any item whose claim is older than the timeout, without charging the
// item an attempt.

use crate::application::worker::ShutdownToken;
use crate::error::Result;
use crate::port::QueueStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

pub struct ReclaimSweeper {
    store: Arc<dyn QueueStore>,
    queues: Vec<String>,
    claim_timeout_ms: i64,
    interval: Duration,
}

impl ReclaimSweeper {
    pub fn new(
        store: Arc<dyn QueueStore>,
        queues: Vec<String>,
        claim_timeout_ms: i64,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            queues,
            claim_timeout_ms,
            interval,
        }
    }

    /// Run the sweep loop: one sweep at startup (covers claims orphaned by
    /// a previous process), then one per interval until shutdown.
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(
            claim_timeout_ms = %self.claim_timeout_ms,
            "Reclaim sweeper started"
        );
        loop {
            if shutdown.is_shutdown() {
                break;
            }

            if let Err(e) = self.sweep_once().await {
                error!("Reclaim sweep failed: {}", e);
            }

            tokio::select! {
                _ = sleep(self.interval) => {},
                _ = shutdown.wait() => break,
            }
        }
        info!("Reclaim sweeper stopped");
        Ok(())
    }

    /// Sweep every queue once, returning the total number of reclaimed items
    pub async fn sweep_once(&self) -> Result<u64> {
        let mut total = 0;
        for queue in &self.queues {
            let reclaimed = self
                .store
                .reclaim_stuck(queue, self.claim_timeout_ms)
                .await?;
            if reclaimed > 0 {
                info!(
                    queue = %queue,
                    count = %reclaimed,
                    "Reclaimed stuck active items"
                );
            }
            total += reclaimed;
        }
        Ok(total)
    }
}
