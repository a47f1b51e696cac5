// Analytics Configuration

use relay_core::application::worker::constants::{
    DEFAULT_CLAIM_TIMEOUT_MS, DEFAULT_DRAIN_TIMEOUT, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_PER_WINDOW,
    DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_SWEEP_INTERVAL,
};
use relay_infra_redis::RedisConfig;
use std::time::Duration;

/// Dispatcher settings. `Default` matches production behavior: 10
/// deliveries per second per queue, one worker per queue, Redis on
/// localhost.
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// Durable store connection
    pub redis: RedisConfig,
    /// Ingestion endpoint override (`None` = the production endpoint)
    pub endpoint: Option<String>,
    /// Deliveries admitted per second, per queue
    pub requests_per_second: u32,
    /// Concurrent workers per queue
    pub concurrency: usize,
    /// Delivery attempts before an item fails terminally
    pub max_attempts: i32,
    /// Base delay for retry backoff
    pub retry_base_delay_ms: i64,
    /// Claim age after which a stuck active item is reclaimed
    pub claim_timeout_ms: i64,
    /// Interval between reclaim sweeps
    pub sweep_interval: Duration,
    /// Time allowed for in-flight deliveries on shutdown
    pub drain_timeout: Duration,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            endpoint: None,
            requests_per_second: DEFAULT_MAX_PER_WINDOW,
            concurrency: 1,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            claim_timeout_ms: DEFAULT_CLAIM_TIMEOUT_MS,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}
