// Rate Limiter (Fixed Window Counter)
//
// Gates dispatch attempts for one queue. The counter itself lives in the
// durable store (LimiterStore port) so the ceiling is shared by every
// worker of the queue, across processes and restarts.

use crate::application::worker::constants::MIN_LIMITER_POLL_INTERVAL;
use crate::error::Result;
use crate::port::LimiterStore;
use std::sync::Arc;
use std::time::Duration;

/// Per-queue dispatch gate: at most `max_per_window` admissions per window
pub struct RateLimiter {
    store: Arc<dyn LimiterStore>,
    queue: String,
    max_per_window: u32,
    window: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `store` - Shared admission counter
    /// * `queue` - Queue this gate belongs to
    /// * `max_per_window` - Admissions per window (default: 10)
    /// * `window` - Window duration (default: 1s)
    pub fn new(
        store: Arc<dyn LimiterStore>,
        queue: impl Into<String>,
        max_per_window: u32,
        window: Duration,
    ) -> Self {
        Self {
            store,
            queue: queue.into(),
            max_per_window,
            window,
        }
    }

    /// Try to consume one admission in the current window
    pub async fn try_acquire(&self) -> Result<bool> {
        self.store
            .try_acquire(&self.queue, self.max_per_window, self.window.as_millis() as i64)
            .await
    }

    /// How long a denied caller should sleep before retrying.
    ///
    /// A quarter window keeps wakeups coarser than the window granularity
    /// without adding a full window of idle latency at the boundary.
    pub fn poll_interval(&self) -> Duration {
        (self.window / 4).max(MIN_LIMITER_POLL_INTERVAL)
    }
}
