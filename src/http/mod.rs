mod client;
pub mod retry;

pub use client::{query_pairs, ApiRequest, HttpClient, API_KEY_HEADER, USER_AGENT};
pub use retry::{is_retryable, with_retry, with_retry_predicate, RetryConfig, RetryConfigBuilder};
