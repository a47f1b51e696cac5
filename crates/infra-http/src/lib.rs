// HTTP Infrastructure - Delivery client adapter

pub mod client;

// Re-exports
pub use client::{HttpDelivery, DEFAULT_ENDPOINT};
