// Queue Domain Model

use serde::{Deserialize, Serialize};

/// Queue identifier
pub type QueueName = String;

/// Queue for user-identification events
pub const IDENTIFY_QUEUE: &str = "identify";

/// Queue for behavioral-tracking events
pub const TRACK_QUEUE: &str = "track";

/// Item counts by state, exposed for observability.
///
/// Completed items are garbage-collected from the store, so `completed`
/// is a running counter rather than a count of retained items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub waiting: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}
