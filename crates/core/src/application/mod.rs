// Application Layer - Dispatch services

pub mod rate_limiter;
pub mod reclaim;
pub mod retry;
pub mod worker;

// Re-exports
pub use rate_limiter::RateLimiter;
pub use reclaim::ReclaimSweeper;
pub use retry::{RetryDecision, RetryPolicy};
pub use worker::{shutdown_channel, ShutdownSender, ShutdownToken, Worker, WorkerPool};
