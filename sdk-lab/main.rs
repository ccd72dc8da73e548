//! Lotus Rust SDK Lab
//!
//! Verification script that drives the SDK against a local mock API.
//! Run with: cargo run --example sdk-lab
//! Set RUST_LOG=lotus=debug to watch flushes and retries.

use lotus::{LotusClient, LotusOptions, RetryConfig, TrackEvent, TRACK_PATH};
use serde_json::{json, Value};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PASS: &str = "\x1b[32m[PASS]\x1b[0m";
const FAIL: &str = "\x1b[31m[FAIL]\x1b[0m";

async fn track_batches(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == TRACK_PATH)
        .filter_map(|r| serde_json::from_slice(&r.body).ok())
        .collect()
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Lotus Rust SDK Lab ===\n");

    let mut passed = 0;
    let mut failed = 0;

    macro_rules! check {
        ($cond:expr, $test:expr) => {{
            if $cond {
                println!("{} {}", PASS, $test);
                passed += 1;
            } else {
                println!("{} {}", FAIL, $test);
                failed += 1;
            }
        }};
    }

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TRACK_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"success": "all"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/plans/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/plans/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"plan_id": "plan_basic"}])),
        )
        .mount(&server)
        .await;

    println!("Testing initialization...");
    check!(
        LotusClient::new(LotusOptions::new("")).is_err(),
        "Empty API key rejected"
    );

    let options = LotusOptions::builder("lab-key")
        .host(server.uri())
        .flush_at(3)
        .flush_interval(Duration::from_millis(200))
        .retry_config(RetryConfig::builder().base_delay_ms(10).build())
        .build();
    let client = match LotusClient::new(options) {
        Ok(c) => c,
        Err(e) => {
            println!("{} Initialization - {}", FAIL, e);
            print_summary(passed, failed + 1);
            std::process::exit(1);
        }
    };
    check!(true, "Initialization");

    println!("\nTesting size-triggered flush...");
    for name in ["a", "b", "c", "d"] {
        let _ = client.track(TrackEvent::new(name, "lab-customer").property("lab", true));
    }
    client.wait_in_flight().await;
    let batches = track_batches(&server).await;
    check!(
        batches.len() == 1 && batches[0]["batch"].as_array().map(Vec::len) == Some(3),
        "First three events sent as one batch"
    );
    check!(client.queue_len() == 1, "Fourth event still queued");

    println!("\nTesting idle timer...");
    check!(client.has_pending_timer(), "Timer armed for remaining event");
    tokio::time::sleep(Duration::from_millis(500)).await;
    client.wait_in_flight().await;
    check!(
        client.queue_len() == 0 && track_batches(&server).await.len() == 2,
        "Timer flushed remaining event"
    );

    println!("\nTesting validation...");
    check!(
        client.track(TrackEvent::new("", "lab-customer")).is_err(),
        "Missing event name rejected"
    );

    println!("\nTesting retries...");
    match client.list_plans().await {
        Ok(plans) => check!(plans.len() == 1, "Plans fetched after one 503"),
        Err(e) => check!(false, format!("Plans fetched after one 503 - {}", e)),
    }

    println!("\nTesting shutdown...");
    let _ = client.track(TrackEvent::new("e", "lab-customer"));
    check!(client.shutdown().await.is_ok(), "Shutdown flushed queue");
    check!(client.queue_len() == 0, "Queue empty after shutdown");

    print_summary(passed, failed);
    if failed > 0 {
        std::process::exit(1);
    }
}

fn print_summary(passed: i32, failed: i32) {
    println!("\n============================================================");
    println!("Summary: {} passed, {} failed", passed, failed);
    println!("============================================================");

    if failed > 0 {
        println!("\n\x1b[31mSome verifications failed!\x1b[0m");
    } else {
        println!("\n\x1b[32mAll verifications passed!\x1b[0m");
    }
}
