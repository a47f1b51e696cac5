//! Simple SDK Example
//!
//! Queues one identify and one track event and lets the background
//! workers deliver them.
//!
//! # Usage
//!
//! 1. Start Redis locally (default port):
//!    ```bash
//!    redis-server
//!    ```
//!
//! 2. Run this example:
//!    ```bash
//!    RELAY_WRITE_KEY=your-write-key cargo run --example simple
//!    ```

use relay_sdk::{Analytics, AnalyticsConfig, EventKind, IdentifyPayload, TrackPayload, Traits};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let write_key = std::env::var("RELAY_WRITE_KEY").unwrap_or_else(|_| "demo-write-key".into());

    // 1. Connect (Redis on localhost, production defaults)
    let analytics = Analytics::connect(write_key, AnalyticsConfig::default()).await?;
    println!("✓ Dispatcher started");

    // 2. Queue events; these calls return as soon as Redis has them
    let item = analytics
        .identify(IdentifyPayload {
            user_id: "019mr8mf4r".to_string(),
            traits: Traits {
                first_name: "Dragon".to_string(),
                email: "dragon@example.com".to_string(),
                registered_at: chrono::Utc::now(),
            },
        })
        .await?;
    println!("✓ Identify queued as item {}", item.id);

    let item = analytics
        .track(TrackPayload {
            event: "Signed Up".to_string(),
            user_id: "019mr8mf4r".to_string(),
            properties: json!({ "plan": "Enterprise" }),
            anonymous_id: None,
        })
        .await?;
    println!("✓ Track queued as item {}", item.id);

    // 3. Give the workers a moment, then inspect the queues
    tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
    for kind in EventKind::all() {
        let counts = analytics.queue_counts(kind).await?;
        println!(
            "  {}: waiting={} active={} completed={} failed={}",
            kind, counts.waiting, counts.active, counts.completed, counts.failed
        );
    }

    // 4. Drain and stop
    analytics.shutdown().await;
    println!("✓ Dispatcher stopped");

    Ok(())
}
