//! Analytics Facade Implementation

use crate::config::AnalyticsConfig;
use relay_core::application::worker::constants::{DEFAULT_RETRY_BACKOFF_FACTOR, DEFAULT_WINDOW};
use relay_core::application::{
    shutdown_channel, RateLimiter, ReclaimSweeper, RetryPolicy, ShutdownSender, Worker, WorkerPool,
};
use relay_core::domain::{Event, EventKind, IdentifyPayload, QueueCounts, QueueItem, TrackPayload};
use relay_core::error::{AppError, Result};
use relay_core::port::{Delivery, LimiterStore, QueueStore, SystemTimeProvider};
use relay_infra_http::HttpDelivery;
use relay_infra_redis::{connection, RedisQueueStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Analytics dispatcher.
///
/// `identify` and `track` enqueue and return immediately; background
/// workers deliver at the configured rate. `post_user` and `post_data`
/// bypass the queue entirely for callers that want the synchronous path.
///
/// # Example
///
/// ```no_run
/// use relay_sdk::{Analytics, AnalyticsConfig};
///
/// # async fn example() -> relay_sdk::Result<()> {
/// let analytics = Analytics::connect("write-key", AnalyticsConfig::default()).await?;
/// # Ok(())
/// # }
/// ```
pub struct Analytics {
    store: Arc<dyn QueueStore>,
    delivery: Arc<dyn Delivery>,
    pools: Vec<WorkerPool>,
    sweeper_handle: JoinHandle<()>,
    shutdown: ShutdownSender,
    drain_timeout: Duration,
}

impl Analytics {
    /// Connect to Redis and start the dispatcher (one worker pool per
    /// queue plus the reclaim sweeper).
    ///
    /// # Arguments
    ///
    /// * `api_key` - Write key sent as the basic-auth username
    /// * `config` - Dispatcher settings
    pub async fn connect(api_key: impl Into<String>, config: AnalyticsConfig) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(AppError::Validation("api key must not be empty".to_string()));
        }

        let conn = connection::connect(&config.redis).await?;
        let store = Arc::new(RedisQueueStore::new(
            conn,
            Arc::new(SystemTimeProvider),
            config.max_attempts,
        ));

        let delivery: Arc<dyn Delivery> = match &config.endpoint {
            Some(endpoint) => Arc::new(HttpDelivery::with_endpoint(api_key, endpoint.as_str())?),
            None => Arc::new(HttpDelivery::new(api_key)?),
        };

        Ok(Self::with_parts(store.clone(), store, delivery, config))
    }

    /// Assemble the dispatcher from explicit ports. This is the seam the
    /// tests use; `connect` is a convenience over it.
    pub fn with_parts(
        store: Arc<dyn QueueStore>,
        limiter_store: Arc<dyn LimiterStore>,
        delivery: Arc<dyn Delivery>,
        config: AnalyticsConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        let retry_policy = Arc::new(RetryPolicy::new(
            config.retry_base_delay_ms,
            DEFAULT_RETRY_BACKOFF_FACTOR,
        ));

        let pools = EventKind::all()
            .into_iter()
            .map(|kind| {
                let limiter = RateLimiter::new(
                    Arc::clone(&limiter_store),
                    kind.queue_name(),
                    config.requests_per_second,
                    DEFAULT_WINDOW,
                );
                let worker = Worker::new(
                    kind.queue_name(),
                    Arc::clone(&store),
                    Arc::clone(&delivery),
                    limiter,
                    Arc::clone(&retry_policy),
                );
                WorkerPool::start(worker, config.concurrency, shutdown_rx.clone())
            })
            .collect();

        let sweeper = ReclaimSweeper::new(
            Arc::clone(&store),
            EventKind::all()
                .iter()
                .map(|k| k.queue_name().to_string())
                .collect(),
            config.claim_timeout_ms,
            config.sweep_interval,
        );
        let sweeper_shutdown = shutdown_rx.clone();
        let sweeper_handle = tokio::spawn(async move {
            let _ = sweeper.run(sweeper_shutdown).await;
        });

        info!(
            requests_per_second = %config.requests_per_second,
            concurrency = %config.concurrency,
            "Analytics dispatcher started"
        );

        Self {
            store,
            delivery,
            pools,
            sweeper_handle,
            shutdown: shutdown_tx,
            drain_timeout: config.drain_timeout,
        }
    }

    /// Queue a user-identification event. Returns once the item is
    /// durably enqueued; delivery happens in the background.
    pub async fn identify(&self, payload: IdentifyPayload) -> Result<QueueItem> {
        self.enqueue(Event::Identify(payload)).await
    }

    /// Queue a behavioral-tracking event
    pub async fn track(&self, payload: TrackPayload) -> Result<QueueItem> {
        self.enqueue(Event::Track(payload)).await
    }

    async fn enqueue(&self, event: Event) -> Result<QueueItem> {
        event.validate()?;
        self.store.enqueue(event.kind().queue_name(), &event).await
    }

    /// Deliver an identify payload right now, bypassing the queue.
    /// No durability, no rate limit, no retry; errors surface directly.
    pub async fn post_user(&self, payload: &IdentifyPayload) -> Result<()> {
        Event::Identify(payload.clone()).validate()?;
        Ok(self.delivery.deliver_identify(payload).await?)
    }

    /// Deliver a track payload right now, bypassing the queue
    pub async fn post_data(&self, payload: &TrackPayload) -> Result<()> {
        Event::Track(payload.clone()).validate()?;
        Ok(self.delivery.deliver_track(payload).await?)
    }

    /// Item counts by state for one queue
    pub async fn queue_counts(&self, kind: EventKind) -> Result<QueueCounts> {
        self.store.counts(kind.queue_name()).await
    }

    /// Stop the dispatcher: signal every worker and the sweeper, then
    /// wait (bounded) for in-flight deliveries to finish. Queued items
    /// stay in the durable store and resume on the next start.
    pub async fn shutdown(self) {
        info!("Analytics dispatcher shutting down");
        self.shutdown.shutdown();
        for pool in self.pools {
            pool.join(self.drain_timeout).await;
        }
        let _ = tokio::time::timeout(self.drain_timeout, self.sweeper_handle).await;
        info!("Analytics dispatcher stopped");
    }
}
