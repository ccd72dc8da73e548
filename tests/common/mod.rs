#![allow(dead_code)]

use lotus::{LotusOptions, LotusOptionsBuilder, RetryConfig, TRACK_PATH};
use serde_json::Value;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Retry policy with millisecond delays and no jitter.
pub fn fast_retry() -> RetryConfig {
    RetryConfig::builder()
        .base_delay_ms(1)
        .max_delay_ms(5)
        .jitter_factor(0.0)
        .build()
}

/// Options pointing at `server` with the idle timer off.
pub fn options(server: &MockServer) -> LotusOptionsBuilder {
    LotusOptions::builder("test-key")
        .host(server.uri())
        .flush_interval(Duration::ZERO)
        .retry_config(fast_retry())
}

pub async fn mount_track_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(TRACK_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "success": "all"
        })))
        .mount(server)
        .await;
}

/// JSON bodies of every request received on the track endpoint, in arrival order.
pub async fn track_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == TRACK_PATH)
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

/// Event names of one batch body, in order.
pub fn event_names(body: &Value) -> Vec<String> {
    body["batch"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event_name"].as_str().unwrap().to_string())
        .collect()
}

pub async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}
