//! Lotus Rust SDK
//!
//! Rust client for the Lotus usage-based billing API.
//!
//! Usage events are buffered in memory and sent in batches, either when
//! `flush_at` events are queued or after `flush_interval` without a flush.
//! Customer, plan, subscription, access, invoice and credit calls go
//! straight to the API. Every request shares one retry policy that retries
//! network failures, timeouts, `429` and `5xx` responses.
//!
//! # Quick Start
//!
//! ```no_run
//! use lotus::{LotusClient, LotusOptions, TrackEvent};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> lotus::Result<()> {
//!     let options = LotusOptions::builder("your_api_key")
//!         .flush_at(50)
//!         .flush_interval(Duration::from_secs(5))
//!         .build();
//!     let client = LotusClient::new(options)?;
//!
//!     client.track(
//!         TrackEvent::new("api_call", "customer-123").property("endpoint", "/search"),
//!     )?;
//!
//!     let plans = client.list_plans().await?;
//!     println!("{} plans", plans.len());
//!
//!     // Send anything still queued before exiting
//!     client.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod error;
pub mod http;
pub mod types;
mod client;

// Re-exports from core module
pub use core::{
    Clock, EventQueue, IdGenerator, LotusOptions, LotusOptionsBuilder, SystemClock, TrackBatch,
    TrackEvent, TrackEventRecord, UuidGenerator,
};

// Re-exports from error module
pub use error::{ErrorCode, LotusError, Result};

// Re-exports from http module
pub use http::{RetryConfig, RetryConfigBuilder};

// Re-exports from types module
pub use types::{
    BehaviorOnExisting, CancelSubscriptionParams, CreateCreditParams, CreateCustomerParams,
    CreateCustomersBatchParams, CreateSubscriptionParams, FeatureAccessParams, FlatFeeBehavior,
    InvoiceFilterParams, MetricAccessParams, SubscriptionFilterParams, UpdateSubscriptionParams,
};

// Re-exports from client module
pub use client::{LotusClient, SDK_VERSION, TRACK_PATH};
