// Domain Layer - Pure business logic and entities

pub mod error;
pub mod event;
pub mod item;
pub mod queue;

// Re-exports
pub use error::DomainError;
pub use event::{Event, EventKind, IdentifyPayload, TrackPayload, Traits};
pub use item::{ItemId, ItemState, QueueItem};
pub use queue::{QueueCounts, QueueName, IDENTIFY_QUEUE, TRACK_QUEUE};
