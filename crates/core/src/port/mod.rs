// Port Layer - Interfaces for external dependencies

pub mod delivery;
pub mod limiter_store;
pub mod queue_store;
pub mod time_provider;

// Re-exports
pub use delivery::{Delivery, DeliveryError};
pub use limiter_store::LimiterStore;
pub use queue_store::QueueStore;
pub use time_provider::{SystemTimeProvider, TimeProvider};
