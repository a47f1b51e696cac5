// Redis Infrastructure - QueueStore and LimiterStore adapters

pub mod connection;
pub mod queue_store;

// Re-exports
pub use connection::RedisConfig;
pub use queue_store::RedisQueueStore;
