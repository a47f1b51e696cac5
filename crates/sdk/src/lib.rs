//! Relay SDK - durable, rate-limited analytics dispatch.
//!
//! Events are accepted immediately into a Redis-backed queue and
//! delivered to the remote ingestion endpoint in the background, at a
//! bounded rate, with retries and crash recovery.

pub mod client;
pub mod config;

// Re-exports
pub use client::Analytics;
pub use config::AnalyticsConfig;
pub use relay_core::domain::{
    Event, EventKind, IdentifyPayload, QueueCounts, QueueItem, TrackPayload, Traits,
};
pub use relay_core::error::{AppError, Result};
pub use relay_infra_redis::RedisConfig;
