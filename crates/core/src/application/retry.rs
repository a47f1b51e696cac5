// Retry logic for failed deliveries
//
// The upstream contract leaves retry behavior open: the endpoint only
// rejects oversized payloads or goes unavailable, and neither is provably
// permanent. We use bounded exponential backoff with a hard attempt
// ceiling so every item reaches a terminal state (completed or failed)
// in finite time.

use crate::application::worker::constants::{
    DEFAULT_RETRY_BACKOFF_FACTOR, DEFAULT_RETRY_BASE_DELAY_MS,
};
use crate::domain::QueueItem;
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the item (with backoff delay in ms)
    Retry(i64),
    /// Do not retry, the item has failed permanently
    Failed,
}

/// Retry policy
///
/// Determines if a delivery failure should be retried based on:
/// - Current attempt count vs the item's attempt ceiling
/// - Exponential backoff from the configured base delay
pub struct RetryPolicy {
    base_delay_ms: i64,
    backoff_factor: f64,
}

impl RetryPolicy {
    /// Create a new retry policy
    ///
    /// # Arguments
    /// * `base_delay_ms` - Base delay in milliseconds (default: 1000)
    /// * `backoff_factor` - Multiplier per attempt (default: 2.0)
    pub fn new(base_delay_ms: i64, backoff_factor: f64) -> Self {
        Self {
            base_delay_ms,
            backoff_factor,
        }
    }

    /// Determine if an item should be retried
    ///
    /// Returns:
    /// - `RetryDecision::Retry(delay_ms)` with calculated backoff
    /// - `RetryDecision::Failed` if the attempt ceiling is reached
    ///
    /// Backoff formula:
    /// delay = base_delay * (backoff_factor ^ attempts) * (1.0 ± 0.1)
    pub fn should_retry(&self, item: &QueueItem) -> RetryDecision {
        if item.attempts >= item.max_attempts {
            warn!(
                item_id = %item.id,
                queue = %item.queue,
                attempts = %item.attempts,
                max_attempts = %item.max_attempts,
                "Max retry attempts reached"
            );
            return RetryDecision::Failed;
        }

        let base_delay_ms = self.base_delay_ms as f64 * self.backoff_factor.powi(item.attempts);

        // ±10% jitter to prevent "Thundering Herd", seeded from the item
        // id so the delay is deterministic per item
        let jitter_factor = 0.9 + ((item.id.unsigned_abs() % 21) as f64 / 100.0); // 0.9 to 1.1
        let delay_ms = (base_delay_ms * jitter_factor) as i64;

        info!(
            item_id = %item.id,
            queue = %item.queue,
            attempt = %item.attempts,
            max_attempts = %item.max_attempts,
            delay_ms = %delay_ms,
            "Scheduling retry"
        );

        RetryDecision::Retry(delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_BACKOFF_FACTOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Event, QueueItem, TrackPayload};
    use serde_json::json;

    fn item_with_attempts(attempts: i32, max_attempts: i32) -> QueueItem {
        let mut item = QueueItem::new(
            42,
            "track",
            Event::Track(TrackPayload {
                event: "dragon".to_string(),
                user_id: "u".to_string(),
                properties: json!({}),
                anonymous_id: None,
            }),
            max_attempts,
            1_000,
        );
        item.attempts = attempts;
        item
    }

    #[test]
    fn backoff_grows_exponentially() {
        let policy = RetryPolicy::new(1_000, 2.0);

        let first = match policy.should_retry(&item_with_attempts(0, 5)) {
            RetryDecision::Retry(d) => d,
            RetryDecision::Failed => panic!("expected retry"),
        };
        let third = match policy.should_retry(&item_with_attempts(2, 5)) {
            RetryDecision::Retry(d) => d,
            RetryDecision::Failed => panic!("expected retry"),
        };

        // Jitter is ±10%, so the base ratio of 4x survives it
        assert!(third >= first * 3);
        assert!((900..=1_100).contains(&first));
    }

    #[test]
    fn fails_once_ceiling_is_reached() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.should_retry(&item_with_attempts(5, 5)),
            RetryDecision::Failed
        );
        assert!(matches!(
            policy.should_retry(&item_with_attempts(4, 5)),
            RetryDecision::Retry(_)
        ));
    }

    #[test]
    fn jitter_is_deterministic_per_item() {
        let policy = RetryPolicy::new(1_000, 2.0);
        let a = policy.should_retry(&item_with_attempts(1, 5));
        let b = policy.should_retry(&item_with_attempts(1, 5));
        assert_eq!(a, b);
    }
}
