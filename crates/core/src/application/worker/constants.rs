// Worker constants (no magic values)
use std::time::Duration;

/// Sleep duration when no items are waiting (100ms)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_millis(100);

/// Sleep duration after a worker error before retrying the loop (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Default admissions per rate-limiter window
pub const DEFAULT_MAX_PER_WINDOW: u32 = 10;

/// Default rate-limiter window (1s)
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// Floor for the rate-limiter backoff poll (10ms); never spin finer
pub const MIN_LIMITER_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default retry base delay (1000ms = 1s)
pub const DEFAULT_RETRY_BASE_DELAY_MS: i64 = 1000;

/// Default exponential backoff factor
pub const DEFAULT_RETRY_BACKOFF_FACTOR: f64 = 2.0;

/// Default retry ceiling before an item fails terminally
pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;

/// Default claim timeout before a stuck active item is reclaimed (5 minutes)
pub const DEFAULT_CLAIM_TIMEOUT_MS: i64 = 5 * 60 * 1000;

/// Default interval between reclaim sweeps (30s)
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Default time allowed for in-flight deliveries to drain on shutdown (5s)
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
