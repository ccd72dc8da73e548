mod common;

use common::{fast_retry, options, request_count};
use lotus::{ErrorCode, LotusClient, LotusOptions, RetryConfig, TrackEvent, TRACK_PATH};
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_status(server: &MockServer, status: u16, expected: u64) {
    Mock::given(method("POST"))
        .and(path(TRACK_PATH))
        .respond_with(ResponseTemplate::new(status))
        .expect(expected)
        .mount(server)
        .await;
}

async fn flush_one(client: &LotusClient) -> lotus::Result<()> {
    client.track(TrackEvent::new("a", "c"))?;
    client.flush().await
}

#[tokio::test]
async fn test_server_error_retried_up_to_retry_count() {
    let server = MockServer::start().await;
    mount_status(&server, 503, 4).await;
    let client = LotusClient::new(options(&server).retry_count(3).build()).unwrap();

    let err = flush_one(&client).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::HttpServerError);
    assert_eq!(err.status, Some(503));
}

#[tokio::test]
async fn test_not_found_not_retried() {
    let server = MockServer::start().await;
    mount_status(&server, 404, 1).await;
    let client = LotusClient::new(options(&server).retry_count(3).build()).unwrap();

    let err = flush_one(&client).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::HttpNotFound);
}

#[tokio::test]
async fn test_unauthorized_not_retried() {
    let server = MockServer::start().await;
    mount_status(&server, 401, 1).await;
    let client = LotusClient::new(options(&server).build()).unwrap();

    let err = flush_one(&client).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::HttpUnauthorized);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_rate_limit_retried() {
    let server = MockServer::start().await;
    mount_status(&server, 429, 3).await;
    let client = LotusClient::new(options(&server).retry_count(2).build()).unwrap();

    let err = flush_one(&client).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::HttpRateLimited);
}

#[tokio::test]
async fn test_recovers_after_transient_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TRACK_PATH))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TRACK_PATH))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    let client = LotusClient::new(options(&server).retry_count(3).build()).unwrap();

    flush_one(&client).await.unwrap();
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn test_zero_retry_count_sends_once() {
    let server = MockServer::start().await;
    mount_status(&server, 500, 1).await;
    let client = LotusClient::new(options(&server).retry_count(0).build()).unwrap();

    assert!(flush_one(&client).await.is_err());
}

#[tokio::test]
async fn test_connection_failure_retried_with_backoff() {
    // Bind then drop to get a port nothing listens on.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let retry = RetryConfig::builder()
        .base_delay_ms(20)
        .jitter_factor(0.0)
        .build();
    let options = LotusOptions::builder("test-key")
        .host(format!("http://127.0.0.1:{}", port))
        .flush_interval(Duration::ZERO)
        .retry_config(retry)
        .retry_count(3)
        .build();
    let client = LotusClient::new(options).unwrap();

    let started = Instant::now();
    let err = flush_one(&client).await.unwrap_err();

    assert_eq!(err.code, ErrorCode::NetworkError);
    assert!(err.is_network_error());
    // 20 + 40 + 80 ms of backoff between the four attempts
    assert!(started.elapsed() >= Duration::from_millis(140));
}

#[tokio::test]
async fn test_timeout_reported_as_network_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TRACK_PATH))
        .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;
    let client = LotusClient::new(
        options(&server)
            .timeout_ms(50)
            .retry_count(1)
            .retry_config(fast_retry())
            .build(),
    )
    .unwrap();

    let err = flush_one(&client).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NetworkTimeout);
    assert!(err.is_retryable());
}
