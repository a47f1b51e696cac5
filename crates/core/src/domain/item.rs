// Queue Item Domain Model
//
// A QueueItem wraps one Event with queue-assigned metadata. The durable
// store owns every item exclusively; workers only reference items by id
// while a claim is held.

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};
use crate::domain::event::Event;

/// Item ID: monotonically increasing per-queue sequence, assigned by the store
pub type ItemId = i64;

/// Item state. Transitions are monotone:
/// waiting -> active -> {completed | failed}, with active -> waiting on
/// retry or reclaim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemState::Waiting => write!(f, "waiting"),
            ItemState::Active => write!(f, "active"),
            ItemState::Completed => write!(f, "completed"),
            ItemState::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ItemState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "waiting" => Ok(ItemState::Waiting),
            "active" => Ok(ItemState::Active),
            "completed" => Ok(ItemState::Completed),
            "failed" => Ok(ItemState::Failed),
            other => Err(DomainError::Internal(format!(
                "unknown item state: {other}"
            ))),
        }
    }
}

/// Queue Item Entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: ItemId,
    pub queue: String,
    pub state: ItemState,

    pub attempts: i32,
    pub max_attempts: i32,

    pub enqueued_at: i64, // epoch ms
    pub claimed_at: Option<i64>,
    pub finished_at: Option<i64>,
    /// Earliest time a retried item may be claimed again (epoch ms)
    pub not_before: Option<i64>,

    pub last_error: Option<String>,

    pub event: Event,
}

impl QueueItem {
    /// Create a new waiting item
    ///
    /// # Arguments
    ///
    /// * `id` - Sequence id assigned by the store (injected, not generated)
    /// * `queue` - Queue name
    /// * `event` - Event payload
    /// * `max_attempts` - Retry ceiling before the item fails terminally
    /// * `enqueued_at` - Enqueue timestamp in epoch ms (injected, not system time)
    pub fn new(
        id: ItemId,
        queue: impl Into<String>,
        event: Event,
        max_attempts: i32,
        enqueued_at: i64,
    ) -> Self {
        Self {
            id,
            queue: queue.into(),
            state: ItemState::Waiting,
            attempts: 0,
            max_attempts,
            enqueued_at,
            claimed_at: None,
            finished_at: None,
            not_before: None,
            last_error: None,
            event,
        }
    }

    /// Transition to Active with explicit timestamp (exclusive claim)
    pub fn claim(&mut self, now_millis: i64) -> Result<()> {
        if self.state != ItemState::Waiting {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: "active".to_string(),
            });
        }
        self.state = ItemState::Active;
        self.claimed_at = Some(now_millis);
        Ok(())
    }

    /// Transition to Completed with explicit timestamp
    pub fn complete(&mut self, now_millis: i64) -> Result<()> {
        if self.state != ItemState::Active {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: "completed".to_string(),
            });
        }
        self.state = ItemState::Completed;
        self.finished_at = Some(now_millis);
        Ok(())
    }

    /// Release the claim and return to Waiting for another attempt.
    ///
    /// `not_before` gates when the item becomes claimable again; `None`
    /// makes it immediately eligible (reclaim path).
    pub fn release_for_retry(&mut self, error: Option<String>, not_before: Option<i64>) {
        self.state = ItemState::Waiting;
        self.claimed_at = None;
        self.not_before = not_before;
        if let Some(error) = error {
            self.attempts += 1;
            self.last_error = Some(error);
        }
    }

    /// Mark as terminally Failed with explicit timestamp
    pub fn fail(&mut self, now_millis: i64, error: impl Into<String>) {
        self.state = ItemState::Failed;
        self.finished_at = Some(now_millis);
        self.last_error = Some(error.into());
    }

    /// True if the item may be claimed at `now_millis`
    pub fn is_claimable(&self, now_millis: i64) -> bool {
        self.state == ItemState::Waiting && self.not_before.map_or(true, |nb| nb <= now_millis)
    }
}
