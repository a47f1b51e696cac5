// HTTP Delivery Client Implementation
//
// One POST per event. The api key travels as the basic-auth username
// with no password, and the payload is the request body as-is.

use async_trait::async_trait;
use relay_core::domain::{IdentifyPayload, TrackPayload};
use relay_core::port::{Delivery, DeliveryError};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Default ingestion endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.segment.io";

/// Request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP Delivery client
pub struct HttpDelivery {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl HttpDelivery {
    /// Create a client against the default endpoint
    pub fn new(api_key: impl Into<String>) -> Result<Self, DeliveryError> {
        Self::with_endpoint(api_key, DEFAULT_ENDPOINT)
    }

    /// Create a client against a custom endpoint (staging, test server)
    pub fn with_endpoint(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DeliveryError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<(), DeliveryError> {
        let url = format!("{}/{}", self.endpoint, path);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.api_key, None::<&str>)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Transport(format!("request timed out: {e}"))
                } else {
                    DeliveryError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(url = %url, status = %status.as_u16(), "Event delivered");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Endpoint {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Delivery for HttpDelivery {
    async fn deliver_identify(&self, payload: &IdentifyPayload) -> Result<(), DeliveryError> {
        self.post("v1/identify", payload).await
    }

    async fn deliver_track(&self, payload: &TrackPayload) -> Result<(), DeliveryError> {
        self.post("v1/track", payload).await
    }
}
