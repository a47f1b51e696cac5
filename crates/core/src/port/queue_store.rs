// Durable Queue Store Port (Interface)
//
// All mutations are durable before the call returns, and claim /
// complete / retry / fail are the only operations needing cross-worker
// mutual exclusion - the store provides it, not in-process locks.

use crate::domain::{Event, ItemId, QueueCounts, QueueItem};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for queue item persistence
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Append a new waiting item atomically. Never blocks on downstream
    /// processing; returns once the item is durably recorded.
    async fn enqueue(&self, queue: &str, event: &Event) -> Result<QueueItem>;

    /// Atomically claim the oldest eligible waiting item (FIFO by enqueue
    /// sequence; retry-delayed items become eligible once their gate
    /// passes). Returns `None` without blocking when nothing is waiting.
    async fn claim_next(&self, queue: &str) -> Result<Option<QueueItem>>;

    /// Mark an active item done and remove it. Idempotent: completing an
    /// already-completed (or unknown) item is a no-op.
    async fn complete(&self, queue: &str, id: ItemId) -> Result<()>;

    /// Release an active item back to waiting for another attempt:
    /// attempt count incremented, error recorded, claimable again after
    /// `delay_ms`. No-op unless the item is active.
    async fn retry(&self, queue: &str, id: ItemId, error: &str, delay_ms: i64) -> Result<()>;

    /// Move an active item to the terminal failed state with the error
    /// recorded; the item is retained for inspection. No-op unless the
    /// item is active (in particular, failing a completed item does
    /// nothing).
    async fn fail(&self, queue: &str, id: ItemId, error: &str) -> Result<()>;

    /// Item counts by state for observability
    async fn counts(&self, queue: &str) -> Result<QueueCounts>;

    /// Return items claimed more than `older_than_ms` ago to the waiting
    /// state, releasing claims orphaned by worker crashes. Returns the
    /// number reclaimed.
    async fn reclaim_stuck(&self, queue: &str, older_than_ms: i64) -> Result<u64>;

    /// Look up one item by id (observability / tests)
    async fn find(&self, queue: &str, id: ItemId) -> Result<Option<QueueItem>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::ItemState;
    use crate::error::AppError;
    use crate::port::limiter_store::LimiterStore;
    use crate::port::time_provider::TimeProvider;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct QueueState {
        next_id: ItemId,
        items: BTreeMap<ItemId, QueueItem>,
        completed: i64,
        window_start: i64,
        window_count: u32,
    }

    /// In-memory store implementing both `QueueStore` and `LimiterStore`,
    /// driven by an injected clock so tests are deterministic.
    pub struct InMemoryQueueStore {
        time: Arc<dyn TimeProvider>,
        max_attempts: i32,
        queues: Mutex<HashMap<String, QueueState>>,
        fail_enqueue: AtomicBool,
    }

    impl InMemoryQueueStore {
        pub fn new(time: Arc<dyn TimeProvider>, max_attempts: i32) -> Self {
            Self {
                time,
                max_attempts,
                queues: Mutex::new(HashMap::new()),
                fail_enqueue: AtomicBool::new(false),
            }
        }

        /// Simulate the storage substrate being unreachable for enqueues
        pub fn set_enqueue_failure(&self, fail: bool) {
            self.fail_enqueue.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl QueueStore for InMemoryQueueStore {
        async fn enqueue(&self, queue: &str, event: &Event) -> Result<QueueItem> {
            if self.fail_enqueue.load(Ordering::SeqCst) {
                return Err(AppError::Storage("store unreachable".to_string()));
            }

            let now = self.time.now_millis();
            let mut queues = self.queues.lock().unwrap();
            let state = queues.entry(queue.to_string()).or_default();

            state.next_id += 1;
            let item = QueueItem::new(state.next_id, queue, event.clone(), self.max_attempts, now);
            state.items.insert(item.id, item.clone());
            Ok(item)
        }

        async fn claim_next(&self, queue: &str) -> Result<Option<QueueItem>> {
            let now = self.time.now_millis();
            let mut queues = self.queues.lock().unwrap();
            let state = queues.entry(queue.to_string()).or_default();

            // BTreeMap iterates in id order, which is enqueue order
            let next_id = state
                .items
                .values()
                .find(|item| item.is_claimable(now))
                .map(|item| item.id);

            match next_id {
                Some(id) => {
                    let item = state.items.get_mut(&id).expect("item exists");
                    item.claim(now)?;
                    Ok(Some(item.clone()))
                }
                None => Ok(None),
            }
        }

        async fn complete(&self, queue: &str, id: ItemId) -> Result<()> {
            let mut queues = self.queues.lock().unwrap();
            let state = queues.entry(queue.to_string()).or_default();

            // Idempotent: only an active item transitions; anything else
            // (already completed and GC'd, reclaimed, failed) is a no-op.
            if state.items.get(&id).map(|i| i.state) == Some(ItemState::Active) {
                state.items.remove(&id);
                state.completed += 1;
            }
            Ok(())
        }

        async fn retry(&self, queue: &str, id: ItemId, error: &str, delay_ms: i64) -> Result<()> {
            let now = self.time.now_millis();
            let mut queues = self.queues.lock().unwrap();
            let state = queues.entry(queue.to_string()).or_default();

            if let Some(item) = state.items.get_mut(&id) {
                if item.state == ItemState::Active {
                    let not_before = (delay_ms > 0).then_some(now + delay_ms);
                    item.release_for_retry(Some(error.to_string()), not_before);
                }
            }
            Ok(())
        }

        async fn fail(&self, queue: &str, id: ItemId, error: &str) -> Result<()> {
            let now = self.time.now_millis();
            let mut queues = self.queues.lock().unwrap();
            let state = queues.entry(queue.to_string()).or_default();

            if let Some(item) = state.items.get_mut(&id) {
                if item.state == ItemState::Active {
                    item.fail(now, error);
                }
            }
            Ok(())
        }

        async fn counts(&self, queue: &str) -> Result<QueueCounts> {
            let mut queues = self.queues.lock().unwrap();
            let state = queues.entry(queue.to_string()).or_default();

            let mut counts = QueueCounts {
                completed: state.completed,
                ..QueueCounts::default()
            };
            for item in state.items.values() {
                match item.state {
                    ItemState::Waiting => counts.waiting += 1,
                    ItemState::Active => counts.active += 1,
                    ItemState::Completed => counts.completed += 1,
                    ItemState::Failed => counts.failed += 1,
                }
            }
            Ok(counts)
        }

        async fn reclaim_stuck(&self, queue: &str, older_than_ms: i64) -> Result<u64> {
            let now = self.time.now_millis();
            let cutoff = now - older_than_ms;
            let mut queues = self.queues.lock().unwrap();
            let state = queues.entry(queue.to_string()).or_default();

            let mut reclaimed = 0;
            for item in state.items.values_mut() {
                if item.state == ItemState::Active && item.claimed_at.unwrap_or(now) < cutoff {
                    item.release_for_retry(None, None);
                    reclaimed += 1;
                }
            }
            Ok(reclaimed)
        }

        async fn find(&self, queue: &str, id: ItemId) -> Result<Option<QueueItem>> {
            let mut queues = self.queues.lock().unwrap();
            let state = queues.entry(queue.to_string()).or_default();
            Ok(state.items.get(&id).cloned())
        }
    }

    #[async_trait]
    impl LimiterStore for InMemoryQueueStore {
        async fn try_acquire(
            &self,
            queue: &str,
            max_per_window: u32,
            window_ms: i64,
        ) -> Result<bool> {
            let now = self.time.now_millis();
            let window_start = now - now.rem_euclid(window_ms);
            let mut queues = self.queues.lock().unwrap();
            let state = queues.entry(queue.to_string()).or_default();

            if state.window_start != window_start {
                state.window_start = window_start;
                state.window_count = 0;
            }
            if state.window_count < max_per_window {
                state.window_count += 1;
                Ok(true)
            } else {
                Ok(false)
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::domain::{Event, TrackPayload, TRACK_QUEUE};
        use crate::port::time_provider::mocks::ManualTimeProvider;
        use serde_json::json;

        fn track_event(name: &str) -> Event {
            Event::Track(TrackPayload {
                event: name.to_string(),
                user_id: "u".to_string(),
                properties: json!({}),
                anonymous_id: None,
            })
        }

        fn store_with_clock() -> (InMemoryQueueStore, Arc<ManualTimeProvider>) {
            let clock = Arc::new(ManualTimeProvider::new(1_000));
            let store = InMemoryQueueStore::new(clock.clone(), 3);
            (store, clock)
        }

        #[tokio::test]
        async fn claims_are_fifo_by_enqueue_order() {
            let (store, _clock) = store_with_clock();
            let a = store.enqueue(TRACK_QUEUE, &track_event("a")).await.unwrap();
            let b = store.enqueue(TRACK_QUEUE, &track_event("b")).await.unwrap();

            let first = store.claim_next(TRACK_QUEUE).await.unwrap().unwrap();
            let second = store.claim_next(TRACK_QUEUE).await.unwrap().unwrap();
            assert_eq!(first.id, a.id);
            assert_eq!(second.id, b.id);
            assert!(store.claim_next(TRACK_QUEUE).await.unwrap().is_none());
        }

        #[tokio::test]
        async fn complete_is_idempotent_and_fail_after_complete_is_noop() {
            let (store, _clock) = store_with_clock();
            let item = store.enqueue(TRACK_QUEUE, &track_event("a")).await.unwrap();
            store.claim_next(TRACK_QUEUE).await.unwrap().unwrap();

            store.complete(TRACK_QUEUE, item.id).await.unwrap();
            store.complete(TRACK_QUEUE, item.id).await.unwrap();
            store.fail(TRACK_QUEUE, item.id, "late error").await.unwrap();

            let counts = store.counts(TRACK_QUEUE).await.unwrap();
            assert_eq!(counts.completed, 1);
            assert_eq!(counts.failed, 0);
        }

        #[tokio::test]
        async fn retried_item_is_gated_until_its_delay_passes() {
            let (store, clock) = store_with_clock();
            let item = store.enqueue(TRACK_QUEUE, &track_event("a")).await.unwrap();
            store.claim_next(TRACK_QUEUE).await.unwrap().unwrap();
            store
                .retry(TRACK_QUEUE, item.id, "boom", 5_000)
                .await
                .unwrap();

            assert!(store.claim_next(TRACK_QUEUE).await.unwrap().is_none());
            clock.advance(5_000);
            let reclaimed = store.claim_next(TRACK_QUEUE).await.unwrap().unwrap();
            assert_eq!(reclaimed.id, item.id);
            assert_eq!(reclaimed.attempts, 1);
        }

        #[tokio::test]
        async fn retried_item_outranks_newer_arrivals_once_eligible() {
            let (store, clock) = store_with_clock();
            let first = store.enqueue(TRACK_QUEUE, &track_event("first")).await.unwrap();
            store.claim_next(TRACK_QUEUE).await.unwrap().unwrap();
            store
                .retry(TRACK_QUEUE, first.id, "boom", 5_000)
                .await
                .unwrap();
            let second = store
                .enqueue(TRACK_QUEUE, &track_event("second"))
                .await
                .unwrap();

            clock.advance(5_000);
            let claimed = store.claim_next(TRACK_QUEUE).await.unwrap().unwrap();
            assert_eq!(claimed.id, first.id);
            let next = store.claim_next(TRACK_QUEUE).await.unwrap().unwrap();
            assert_eq!(next.id, second.id);
        }

        #[tokio::test]
        async fn reclaim_returns_stuck_active_items() {
            let (store, clock) = store_with_clock();
            let item = store.enqueue(TRACK_QUEUE, &track_event("a")).await.unwrap();
            store.claim_next(TRACK_QUEUE).await.unwrap().unwrap();

            clock.advance(10_000);
            assert_eq!(store.reclaim_stuck(TRACK_QUEUE, 60_000).await.unwrap(), 0);
            assert_eq!(store.reclaim_stuck(TRACK_QUEUE, 5_000).await.unwrap(), 1);

            let found = store.find(TRACK_QUEUE, item.id).await.unwrap().unwrap();
            assert_eq!(found.state, ItemState::Waiting);
        }

        #[tokio::test]
        async fn limiter_resets_at_window_boundary() {
            let (store, clock) = store_with_clock();
            for _ in 0..2 {
                assert!(store.try_acquire(TRACK_QUEUE, 2, 1_000).await.unwrap());
            }
            assert!(!store.try_acquire(TRACK_QUEUE, 2, 1_000).await.unwrap());

            clock.advance(1_000);
            assert!(store.try_acquire(TRACK_QUEUE, 2, 1_000).await.unwrap());
        }
    }
}
