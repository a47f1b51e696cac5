// Dispatch Worker - delivery loop for one queue

pub mod constants;
mod shutdown;

pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::rate_limiter::RateLimiter;
use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::domain::QueueItem;
use crate::error::Result;
use crate::port::{Delivery, QueueStore};
use constants::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Worker delivers queued items for one queue.
///
/// Loop shape: wait for a rate-limiter admission, claim the oldest
/// waiting item, deliver it, report the outcome back to the store. One
/// item's failure never stops the loop.
pub struct Worker {
    queue: String,
    store: Arc<dyn QueueStore>,
    delivery: Arc<dyn Delivery>,
    rate_limiter: RateLimiter,
    retry_policy: Arc<RetryPolicy>,
}

impl Worker {
    pub fn new(
        queue: impl Into<String>,
        store: Arc<dyn QueueStore>,
        delivery: Arc<dyn Delivery>,
        rate_limiter: RateLimiter,
        retry_policy: Arc<RetryPolicy>,
    ) -> Self {
        Self {
            queue: queue.into(),
            store,
            delivery,
            rate_limiter,
            retry_policy,
        }
    }

    /// Run the worker loop with graceful shutdown support
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!("Dispatch worker started for queue: {}", self.queue);
        loop {
            if shutdown.is_shutdown() {
                info!("Worker shutting down for queue: {}", self.queue);
                break;
            }

            // Admission comes before the claim so the dispatch ceiling
            // holds no matter how fast items arrive
            match self.rate_limiter.try_acquire().await {
                Ok(true) => {}
                Ok(false) => {
                    tokio::select! {
                        _ = sleep(self.rate_limiter.poll_interval()) => {},
                        _ = shutdown.wait() => {
                            info!("Worker interrupted while rate limited");
                            break;
                        }
                    }
                    continue;
                }
                Err(e) => {
                    error!("Rate limiter error: {}", e);
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => break,
                    }
                    continue;
                }
            }

            match self.process_next_item().await {
                Ok(true) => {}
                Ok(false) => {
                    // Nothing waiting; the admission is burned, idle briefly
                    tokio::select! {
                        _ = sleep(IDLE_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => {
                            info!("Worker interrupted during idle");
                            break;
                        }
                    }
                }
                Err(e) => {
                    error!("Worker error: {}", e);
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => {
                            info!("Worker interrupted during error recovery");
                            break;
                        }
                    }
                }
            }
        }
        info!("Worker stopped for queue: {}", self.queue);
        Ok(())
    }

    /// Claim and deliver the next item (returns true if an item was processed)
    pub async fn process_next_item(&self) -> Result<bool> {
        let item = match self.store.claim_next(&self.queue).await? {
            Some(item) => item,
            None => return Ok(false),
        };

        info!(
            item_id = %item.id,
            queue = %self.queue,
            attempt = %item.attempts,
            "Delivering item"
        );

        // Deliver in a spawned task so a panicking client cannot take the
        // worker loop down with it
        let delivery = Arc::clone(&self.delivery);
        let event = item.event.clone();
        let handle = tokio::task::spawn(async move { delivery.deliver(&event).await });

        match handle.await {
            Ok(Ok(())) => {
                self.store.complete(&self.queue, item.id).await?;
                info!(item_id = %item.id, queue = %self.queue, "Item delivered");
            }
            Ok(Err(e)) => {
                self.handle_failure(&item, e.to_string()).await?;
            }
            Err(join_err) => {
                if join_err.is_panic() {
                    error!(item_id = %item.id, "Delivery panicked: {:?}", join_err);
                } else {
                    error!(item_id = %item.id, "Delivery task cancelled: {:?}", join_err);
                }
                // Panics are not retried; record the failure and move on
                self.store
                    .fail(&self.queue, item.id, &format!("delivery task aborted: {join_err}"))
                    .await?;
            }
        }
        Ok(true)
    }

    async fn handle_failure(&self, item: &QueueItem, error: String) -> Result<()> {
        match self.retry_policy.should_retry(item) {
            RetryDecision::Retry(delay_ms) => {
                warn!(
                    item_id = %item.id,
                    queue = %self.queue,
                    attempt = %item.attempts,
                    delay_ms = %delay_ms,
                    error = %error,
                    "Delivery failed, requeueing for retry"
                );
                self.store.retry(&self.queue, item.id, &error, delay_ms).await
            }
            RetryDecision::Failed => {
                error!(
                    item_id = %item.id,
                    queue = %self.queue,
                    error = %error,
                    "Item failed terminally after max retries"
                );
                self.store.fail(&self.queue, item.id, &error).await
            }
        }
    }
}

/// Fixed-concurrency pool of workers for one queue.
///
/// Default concurrency is 1: deliberately serialized to keep intra-queue
/// ordering simple and avoid amplifying load on the remote endpoint.
pub struct WorkerPool {
    queue: String,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `concurrency` loops over one shared worker
    pub fn start(worker: Worker, concurrency: usize, shutdown: ShutdownToken) -> Self {
        let queue = worker.queue.clone();
        let worker = Arc::new(worker);

        let handles = (0..concurrency.max(1))
            .map(|_| {
                let worker = Arc::clone(&worker);
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    if let Err(e) = worker.run(shutdown).await {
                        error!("Worker loop failed: {}", e);
                    }
                })
            })
            .collect();

        Self { queue, handles }
    }

    /// Await worker loops after shutdown was signalled, bounded by
    /// `drain_timeout` per worker so a wedged delivery cannot hang the
    /// caller forever.
    pub async fn join(self, drain_timeout: Duration) {
        for handle in self.handles {
            if tokio::time::timeout(drain_timeout, handle).await.is_err() {
                warn!(queue = %self.queue, "Worker did not drain before timeout");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Event, ItemState, TrackPayload, TRACK_QUEUE};
    use crate::port::delivery::mocks::MockDelivery;
    use crate::port::queue_store::mocks::InMemoryQueueStore;
    use crate::port::time_provider::mocks::ManualTimeProvider;
    use crate::port::time_provider::TimeProvider;
    use serde_json::json;

    fn track_event(name: &str) -> Event {
        Event::Track(TrackPayload {
            event: name.to_string(),
            user_id: "u".to_string(),
            properties: json!({}),
            anonymous_id: None,
        })
    }

    struct Fixture {
        store: Arc<InMemoryQueueStore>,
        clock: Arc<ManualTimeProvider>,
    }

    fn fixture(max_attempts: i32) -> Fixture {
        let clock = Arc::new(ManualTimeProvider::new(1_000));
        let store = Arc::new(InMemoryQueueStore::new(clock.clone(), max_attempts));
        Fixture { store, clock }
    }

    fn worker(fx: &Fixture, delivery: Arc<MockDelivery>) -> Worker {
        let limiter = RateLimiter::new(
            fx.store.clone(),
            TRACK_QUEUE,
            1_000, // effectively unlimited for these tests
            Duration::from_secs(1),
        );
        Worker::new(
            TRACK_QUEUE,
            fx.store.clone(),
            delivery,
            limiter,
            Arc::new(RetryPolicy::new(100, 2.0)),
        )
    }

    #[tokio::test]
    async fn successful_delivery_completes_the_item() {
        let fx = fixture(5);
        let delivery = Arc::new(MockDelivery::new_success());
        let worker = worker(&fx, delivery.clone());

        fx.store.enqueue(TRACK_QUEUE, &track_event("a")).await.unwrap();
        assert!(worker.process_next_item().await.unwrap());

        assert_eq!(delivery.call_count(), 1);
        let counts = fx.store.counts(TRACK_QUEUE).await.unwrap();
        assert_eq!(counts.waiting, 0);
        assert_eq!(counts.completed, 1);
    }

    #[tokio::test]
    async fn no_waiting_item_returns_false() {
        let fx = fixture(5);
        let worker = worker(&fx, Arc::new(MockDelivery::new_success()));
        assert!(!worker.process_next_item().await.unwrap());
    }

    #[tokio::test]
    async fn failed_delivery_is_requeued_with_backoff() {
        let fx = fixture(5);
        let delivery = Arc::new(MockDelivery::new_fail_times(1));
        let worker = worker(&fx, delivery.clone());

        let item = fx.store.enqueue(TRACK_QUEUE, &track_event("a")).await.unwrap();
        assert!(worker.process_next_item().await.unwrap());

        let stored = fx.store.find(TRACK_QUEUE, item.id).await.unwrap().unwrap();
        assert_eq!(stored.state, ItemState::Waiting);
        assert_eq!(stored.attempts, 1);
        assert!(stored.not_before.unwrap() > fx.clock.now_millis());

        // After the gate passes, the next cycle succeeds
        fx.clock.advance(1_000);
        assert!(worker.process_next_item().await.unwrap());
        assert_eq!(delivery.call_count(), 2);
        assert_eq!(fx.store.counts(TRACK_QUEUE).await.unwrap().completed, 1);
    }

    #[tokio::test]
    async fn item_fails_terminally_after_attempt_ceiling() {
        let fx = fixture(2);
        let delivery = Arc::new(MockDelivery::new_always_fail("payload too large"));
        let worker = worker(&fx, delivery.clone());

        let item = fx.store.enqueue(TRACK_QUEUE, &track_event("a")).await.unwrap();
        for _ in 0..3 {
            fx.clock.advance(10_000);
            assert!(worker.process_next_item().await.unwrap());
        }

        let stored = fx.store.find(TRACK_QUEUE, item.id).await.unwrap().unwrap();
        assert_eq!(stored.state, ItemState::Failed);
        assert!(stored
            .last_error
            .as_deref()
            .unwrap()
            .contains("payload too large"));
        assert_eq!(delivery.call_count(), 3);
    }

    #[tokio::test]
    async fn delivery_panic_does_not_kill_the_worker() {
        let fx = fixture(5);
        let delivery = Arc::new(MockDelivery::new_panicking("client exploded"));
        let worker = worker(&fx, delivery);

        let item = fx.store.enqueue(TRACK_QUEUE, &track_event("a")).await.unwrap();
        // The panic is isolated in the spawned task
        assert!(worker.process_next_item().await.unwrap());

        let stored = fx.store.find(TRACK_QUEUE, item.id).await.unwrap().unwrap();
        assert_eq!(stored.state, ItemState::Failed);

        // Worker keeps processing subsequent items
        assert!(!worker.process_next_item().await.unwrap());
    }

    #[tokio::test]
    async fn items_are_processed_in_enqueue_order() {
        let fx = fixture(5);
        let delivery = Arc::new(MockDelivery::new_success());
        let worker = worker(&fx, delivery.clone());

        for name in ["first", "second", "third"] {
            fx.store.enqueue(TRACK_QUEUE, &track_event(name)).await.unwrap();
        }
        while worker.process_next_item().await.unwrap() {}

        let names: Vec<String> = delivery
            .delivered_events()
            .into_iter()
            .map(|e| match e {
                Event::Track(p) => p.event,
                Event::Identify(_) => unreachable!(),
            })
            .collect();
        assert_eq!(names, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn pool_drains_on_shutdown() {
        let fx = fixture(5);
        let delivery = Arc::new(MockDelivery::new_success());
        let w = worker(&fx, delivery.clone());
        fx.store.enqueue(TRACK_QUEUE, &track_event("a")).await.unwrap();

        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        let pool = WorkerPool::start(w, 1, shutdown_rx);

        // Give the loop a moment to pick the item up
        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown_tx.shutdown();
        pool.join(Duration::from_secs(2)).await;

        assert_eq!(delivery.call_count(), 1);
        assert_eq!(fx.store.counts(TRACK_QUEUE).await.unwrap().completed, 1);
    }
}
