// Delivery Client Port
// Abstraction over the outbound call to the remote ingestion endpoint.
// Stateless: one event in, one call out, no queue awareness.

use crate::domain::{Event, IdentifyPayload, TrackPayload};
use async_trait::async_trait;
use thiserror::Error;

/// Delivery errors.
///
/// The remote endpoint accepts essentially all well-formed requests and
/// only signals failure for oversized payloads or unavailability, so no
/// variant here implies a permanent error - retry policy is the caller's
/// decision.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("endpoint returned status {status}: {body}")]
    Endpoint { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("payload serialization failed: {0}")]
    Serialization(String),
}

/// Delivery Client trait
///
/// Implementations:
/// - HttpDelivery (infra-http): POST per event with basic-auth credential
/// - MockDelivery (tests): scripted success/failure, records calls
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Send one identify payload to the remote endpoint
    async fn deliver_identify(&self, payload: &IdentifyPayload) -> Result<(), DeliveryError>;

    /// Send one track payload to the remote endpoint
    async fn deliver_track(&self, payload: &TrackPayload) -> Result<(), DeliveryError>;

    /// Dispatch on the event kind
    async fn deliver(&self, event: &Event) -> Result<(), DeliveryError> {
        match event {
            Event::Identify(payload) => self.deliver_identify(payload).await,
            Event::Track(payload) => self.deliver_track(payload).await,
        }
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    /// Mock delivery behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always succeed
        Success,
        /// Fail the first N calls, then succeed
        FailTimes(u32),
        /// Always fail with an endpoint rejection carrying this body
        AlwaysFail(String),
        /// Panic with message (for panic isolation testing)
        Panic(String),
    }

    /// One observed delivery call
    #[derive(Debug, Clone)]
    pub struct DeliveryCall {
        pub at: Instant,
        pub event: Event,
    }

    /// Mock Delivery Client for testing
    pub struct MockDelivery {
        behavior: Arc<Mutex<MockBehavior>>,
        calls: Arc<Mutex<Vec<DeliveryCall>>>,
    }

    impl MockDelivery {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Arc::new(Mutex::new(behavior)),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }

        pub fn new_fail_times(times: u32) -> Self {
            Self::new(MockBehavior::FailTimes(times))
        }

        pub fn new_always_fail(body: impl Into<String>) -> Self {
            Self::new(MockBehavior::AlwaysFail(body.into()))
        }

        pub fn new_panicking(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Panic(message.into()))
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn calls(&self) -> Vec<DeliveryCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn delivered_events(&self) -> Vec<Event> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|c| c.event.clone())
                .collect()
        }

        fn record(&self, event: Event) -> Result<(), DeliveryError> {
            self.calls.lock().unwrap().push(DeliveryCall {
                at: Instant::now(),
                event,
            });

            let mut behavior = self.behavior.lock().unwrap();
            match &mut *behavior {
                MockBehavior::Success => Ok(()),
                MockBehavior::FailTimes(remaining) => {
                    if *remaining > 0 {
                        *remaining -= 1;
                        Err(DeliveryError::Transport("injected failure".to_string()))
                    } else {
                        Ok(())
                    }
                }
                MockBehavior::AlwaysFail(body) => Err(DeliveryError::Endpoint {
                    status: 400,
                    body: body.clone(),
                }),
                MockBehavior::Panic(message) => {
                    let message = message.clone();
                    drop(behavior);
                    panic!("{}", message); // Actually panic for isolation testing
                }
            }
        }
    }

    #[async_trait]
    impl Delivery for MockDelivery {
        async fn deliver_identify(&self, payload: &IdentifyPayload) -> Result<(), DeliveryError> {
            self.record(Event::Identify(payload.clone()))
        }

        async fn deliver_track(&self, payload: &TrackPayload) -> Result<(), DeliveryError> {
            self.record(Event::Track(payload.clone()))
        }
    }
}
