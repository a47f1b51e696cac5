// Rate Limiter Store Port
//
// The admission counter lives in the durable store so the ceiling holds
// across all workers of a queue AND across process restarts. This is the
// single contended resource in the system; implementations must update it
// atomically.

use crate::error::Result;
use async_trait::async_trait;

/// Fixed-window admission counter shared by all workers of a queue
#[async_trait]
pub trait LimiterStore: Send + Sync {
    /// Try to consume one admission in the current window.
    ///
    /// Returns `true` if fewer than `max_per_window` admissions have been
    /// granted in the window containing now, and atomically records the
    /// admission. Returns `false` when the window is exhausted; callers
    /// back off and retry after the window rolls over.
    async fn try_acquire(&self, queue: &str, max_per_window: u32, window_ms: i64) -> Result<bool>;
}
