mod common;

use chrono::{TimeZone, Utc};
use common::{event_names, fast_retry, mount_track_ok, options, request_count, track_bodies};
use lotus::core::{FixedClock, ScriptedIdGenerator, SequentialIdGenerator};
use lotus::{ErrorCode, LotusClient, LotusOptions, TrackEvent, TRACK_PATH};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod batching_tests {
    use super::*;

    #[tokio::test]
    async fn test_size_threshold_sends_oldest_events() {
        let server = MockServer::start().await;
        mount_track_ok(&server).await;
        let client = LotusClient::new(options(&server).flush_at(2).build()).unwrap();

        client.track(TrackEvent::new("a", "cust_1")).unwrap();
        client.track(TrackEvent::new("b", "cust_1")).unwrap();
        client.track(TrackEvent::new("c", "cust_1")).unwrap();
        client.wait_in_flight().await;

        let bodies = track_bodies(&server).await;
        assert_eq!(bodies.len(), 1);
        assert_eq!(event_names(&bodies[0]), vec!["a", "b"]);

        assert_eq!(client.queue_len(), 1);
        assert_eq!(client.pending_events()[0].event_name, "c");
    }

    #[tokio::test]
    async fn test_batches_preserve_insertion_order() {
        let server = MockServer::start().await;
        mount_track_ok(&server).await;
        let client = LotusClient::new(options(&server).flush_at(3).build()).unwrap();

        for name in ["e1", "e2", "e3"] {
            client.track(TrackEvent::new(name, "cust_1")).unwrap();
        }
        client.wait_in_flight().await;
        for name in ["e4", "e5", "e6"] {
            client.track(TrackEvent::new(name, "cust_1")).unwrap();
        }
        client.wait_in_flight().await;
        client.track(TrackEvent::new("e7", "cust_1")).unwrap();
        client.flush().await.unwrap();

        let bodies = track_bodies(&server).await;
        assert_eq!(bodies.len(), 3);
        assert_eq!(event_names(&bodies[0]), vec!["e1", "e2", "e3"]);
        assert_eq!(event_names(&bodies[1]), vec!["e4", "e5", "e6"]);
        assert_eq!(event_names(&bodies[2]), vec!["e7"]);
        assert_eq!(client.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_explicit_flush_sends_at_most_flush_at() {
        let server = MockServer::start().await;
        mount_track_ok(&server).await;
        let client = LotusClient::new(options(&server).flush_at(10).build()).unwrap();

        client
            .track_batch((0..4).map(|i| TrackEvent::new(format!("e{}", i), "c")).collect())
            .unwrap();
        client.flush().await.unwrap();

        let bodies = track_bodies(&server).await;
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["batch"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_flush_empty_queue_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TRACK_PATH))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;
        let client = LotusClient::new(options(&server).build()).unwrap();

        client.flush().await.unwrap();
        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_drains_everything() {
        let server = MockServer::start().await;
        mount_track_ok(&server).await;
        let client = LotusClient::new(options(&server).flush_at(2).build()).unwrap();

        for i in 0..5 {
            client.track(TrackEvent::new(format!("e{}", i), "c")).unwrap();
        }
        client.shutdown().await.unwrap();

        let total: usize = track_bodies(&server)
            .await
            .iter()
            .map(|b| b["batch"].as_array().unwrap().len())
            .sum();
        assert_eq!(total, 5);
        assert_eq!(client.queue_len(), 0);
        assert!(!client.has_pending_timer());
    }

    #[tokio::test]
    async fn test_oversized_track_batch_flushes_once() {
        let server = MockServer::start().await;
        mount_track_ok(&server).await;
        let client = LotusClient::new(options(&server).flush_at(2).build()).unwrap();

        client
            .track_batch((0..5).map(|i| TrackEvent::new(format!("e{}", i), "c")).collect())
            .unwrap();
        client.wait_in_flight().await;

        let bodies = track_bodies(&server).await;
        assert_eq!(bodies.len(), 1);
        assert_eq!(event_names(&bodies[0]), vec!["e0", "e1"]);
        assert_eq!(client.queue_len(), 3);

        // the next track picks up where the last flush stopped
        client.track(TrackEvent::new("e5", "c")).unwrap();
        client.wait_in_flight().await;
        let bodies = track_bodies(&server).await;
        assert_eq!(event_names(&bodies[1]), vec!["e2", "e3"]);
        assert_eq!(client.queue_len(), 2);
    }
}

mod wire_format_tests {
    use super::*;

    #[tokio::test]
    async fn test_record_fields_and_library_tag() {
        let server = MockServer::start().await;
        mount_track_ok(&server).await;
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let client = LotusClient::with_sources(
            options(&server).build(),
            Arc::new(FixedClock(at)),
            Arc::new(SequentialIdGenerator::new("evt")),
        )
        .unwrap();

        client
            .track(TrackEvent::new("api_call", "cust_1").property("region", "eu"))
            .unwrap();
        client.flush().await.unwrap();

        let bodies = track_bodies(&server).await;
        assert_eq!(
            bodies[0],
            json!({
                "batch": [{
                    "event_name": "api_call",
                    "customer_id": "cust_1",
                    "idempotency_id": "evt-1",
                    "time_created": "2024-05-01T12:00:00Z",
                    "properties": {"region": "eu", "$lib": "lotus-rust"}
                }]
            })
        );
    }

    #[tokio::test]
    async fn test_caller_supplied_id_and_time_kept() {
        let server = MockServer::start().await;
        mount_track_ok(&server).await;
        let client = LotusClient::new(options(&server).build()).unwrap();
        let at = Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap();

        client
            .track(TrackEvent::new("a", "c").idempotency_id("mine").time_created(at))
            .unwrap();
        client.flush().await.unwrap();

        let record = &track_bodies(&server).await[0]["batch"][0];
        assert_eq!(record["idempotency_id"], "mine");
        assert_eq!(record["time_created"], "2023-01-02T03:04:05Z");
    }

    #[tokio::test]
    async fn test_injected_ids_fill_only_missing_ids() {
        let server = MockServer::start().await;
        mount_track_ok(&server).await;
        let client = LotusClient::with_sources(
            options(&server).build(),
            Arc::new(FixedClock(Utc::now())),
            Arc::new(ScriptedIdGenerator::new(["order-1", "order-2"])),
        )
        .unwrap();

        client.track(TrackEvent::new("a", "c")).unwrap();
        client.track(TrackEvent::new("b", "c").idempotency_id("mine")).unwrap();
        client.track(TrackEvent::new("c", "c")).unwrap();
        client.track(TrackEvent::new("d", "c")).unwrap();

        let ids: Vec<_> = client
            .pending_events()
            .into_iter()
            .map(|r| r.idempotency_id)
            .collect();
        assert_eq!(&ids[..3], ["order-1", "mine", "order-2"]);
        // script exhausted, back to random ids
        assert!(uuid::Uuid::parse_str(&ids[3]).is_ok());
    }

    #[tokio::test]
    async fn test_generated_ids_are_distinct_uuids() {
        let server = MockServer::start().await;
        mount_track_ok(&server).await;
        let client = LotusClient::new(options(&server).flush_at(50).build()).unwrap();

        for _ in 0..25 {
            client.track(TrackEvent::new("a", "c")).unwrap();
        }
        client.flush().await.unwrap();

        let body = &track_bodies(&server).await[0];
        let ids: HashSet<_> = body["batch"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["idempotency_id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids.len(), 25);
        for id in &ids {
            assert!(uuid::Uuid::parse_str(id).is_ok());
        }
    }

    #[tokio::test]
    async fn test_api_key_header_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TRACK_PATH))
            .and(header("X-API-KEY", "test-key"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        let client = LotusClient::new(options(&server).build()).unwrap();

        client.track(TrackEvent::new("a", "c")).unwrap();
        client.flush().await.unwrap();
    }

    #[tokio::test]
    async fn test_camel_case_json_accepted() {
        let server = MockServer::start().await;
        mount_track_ok(&server).await;
        let client = LotusClient::new(options(&server).build()).unwrap();

        let event = TrackEvent::from_value(json!({
            "eventName": "rows_inserted",
            "customerId": "cust_9",
            "properties": {"rows": 30}
        }))
        .unwrap();
        client.track(event).unwrap();
        client.flush().await.unwrap();

        let record = &track_bodies(&server).await[0]["batch"][0];
        assert_eq!(record["event_name"], "rows_inserted");
        assert_eq!(record["customer_id"], "cust_9");
        assert_eq!(record["properties"]["rows"], 30);
    }
}

mod validation_tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_event_rejected_and_queue_unchanged() {
        let server = MockServer::start().await;
        let client = LotusClient::new(options(&server).build()).unwrap();
        client.track(TrackEvent::new("kept", "c")).unwrap();

        let event = TrackEvent::from_value(json!({})).unwrap();
        let err = client.track(event).unwrap_err();

        assert_eq!(err.code, ErrorCode::ValidationMissingField);
        assert_eq!(err.message, "customer_id is a required key");
        assert_eq!(client.queue_len(), 1);
        assert_eq!(request_count(&server).await, 0);
    }

    #[tokio::test]
    async fn test_missing_event_name_rejected() {
        let server = MockServer::start().await;
        let client = LotusClient::new(options(&server).build()).unwrap();

        let err = client.track(TrackEvent::new("", "c")).unwrap_err();
        assert_eq!(err.message, "event_name is a required key");
        assert_eq!(client.queue_len(), 0);
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let err = LotusClient::new(LotusOptions::new("")).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigMissingApiKey);
        assert_eq!(err.to_string(), "[CONFIG_MISSING_API_KEY] Api Key is required");
    }

    #[tokio::test]
    async fn test_disabled_client_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;
        let client =
            LotusClient::new(options(&server).enable(false).flush_at(1).build()).unwrap();

        client.track(TrackEvent::new("a", "c")).unwrap();
        client.track(TrackEvent::default()).unwrap();
        client.flush().await.unwrap();
        client.shutdown().await.unwrap();

        assert_eq!(client.queue_len(), 0);
    }
}

mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_batch_is_not_requeued() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TRACK_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "type": "validation_error",
                "detail": "bad batch"
            })))
            .expect(1)
            .mount(&server)
            .await;
        let client = LotusClient::new(options(&server).build()).unwrap();

        client.track(TrackEvent::new("a", "c")).unwrap();
        let err = client.flush().await.unwrap_err();

        assert_eq!(err.code, ErrorCode::HttpBadRequest);
        assert_eq!(err.status, Some(400));
        assert!(err.message.contains("bad batch"));
        assert_eq!(client.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_non_json_success_body_is_a_successful_flush() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TRACK_PATH))
            .respond_with(ResponseTemplate::new(201).set_body_string("OK"))
            .expect(1)
            .mount(&server)
            .await;
        let client = LotusClient::new(options(&server).build()).unwrap();

        client.track(TrackEvent::new("a", "c")).unwrap();
        client.flush().await.unwrap();
        assert_eq!(client.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_empty_success_body_is_a_successful_flush() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TRACK_PATH))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        let client = LotusClient::new(options(&server).build()).unwrap();

        client.track(TrackEvent::new("a", "c")).unwrap();
        client.flush().await.unwrap();
    }

    #[tokio::test]
    async fn test_background_failure_does_not_surface_from_track() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TRACK_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let client = LotusClient::new(
            options(&server)
                .flush_at(1)
                .retry_count(1)
                .retry_config(fast_retry())
                .build(),
        )
        .unwrap();

        client.track(TrackEvent::new("a", "c")).unwrap();
        client.wait_in_flight().await;

        assert_eq!(request_count(&server).await, 2);
        assert_eq!(client.queue_len(), 0);
    }
}


// These run on tokio's paused clock: sleeping jumps virtual time forward as
// soon as the runtime is idle, so timer deadlines are reached deterministically.
mod timer_tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(100);

    fn timed_options(server: &MockServer, flush_at: usize, interval: Duration) -> LotusOptions {
        options(server)
            .flush_at(flush_at)
            .flush_interval(interval)
            .build()
    }

    /// Lets every timer armed so far expire, then waits for the flushes it started.
    async fn idle(client: &LotusClient) {
        tokio::time::sleep(INTERVAL * 3).await;
        client.wait_in_flight().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timer_flushes_partial_batch() {
        let server = MockServer::start().await;
        mount_track_ok(&server).await;
        let client = LotusClient::new(timed_options(&server, 100, INTERVAL)).unwrap();

        client.track(TrackEvent::new("a", "c")).unwrap();
        assert!(client.has_pending_timer());

        idle(&client).await;

        let bodies = track_bodies(&server).await;
        assert_eq!(bodies.len(), 1);
        assert_eq!(event_names(&bodies[0]), vec!["a"]);
        assert!(!client.has_pending_timer());
        assert_eq!(client.queue_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_not_fired_before_interval() {
        let server = MockServer::start().await;
        mount_track_ok(&server).await;
        let client = LotusClient::new(timed_options(&server, 100, INTERVAL)).unwrap();

        client.track(TrackEvent::new("a", "c")).unwrap();
        tokio::time::advance(INTERVAL / 2).await;

        assert!(client.has_pending_timer());
        assert_eq!(client.queue_len(), 1);
        assert_eq!(request_count(&server).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_timer_across_tracks() {
        let server = MockServer::start().await;
        mount_track_ok(&server).await;
        let client = LotusClient::new(timed_options(&server, 100, INTERVAL)).unwrap();

        client.track(TrackEvent::new("a", "c")).unwrap();
        tokio::time::advance(INTERVAL / 5).await;
        client.track(TrackEvent::new("b", "c")).unwrap();
        assert!(client.has_pending_timer());

        idle(&client).await;

        let bodies = track_bodies(&server).await;
        assert_eq!(bodies.len(), 1);
        assert_eq!(event_names(&bodies[0]), vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_flush_cancels_timer() {
        let server = MockServer::start().await;
        mount_track_ok(&server).await;
        let client = LotusClient::new(timed_options(&server, 100, INTERVAL)).unwrap();

        client.track(TrackEvent::new("a", "c")).unwrap();
        client.flush().await.unwrap();
        assert!(!client.has_pending_timer());

        idle(&client).await;
        assert_eq!(track_bodies(&server).await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_rearmed_after_timer_flush() {
        let server = MockServer::start().await;
        mount_track_ok(&server).await;
        let client = LotusClient::new(timed_options(&server, 100, INTERVAL)).unwrap();

        client.track(TrackEvent::new("a", "c")).unwrap();
        idle(&client).await;
        assert!(!client.has_pending_timer());

        client.track(TrackEvent::new("b", "c")).unwrap();
        assert!(client.has_pending_timer());
        idle(&client).await;

        let bodies = track_bodies(&server).await;
        assert_eq!(bodies.len(), 2);
        assert_eq!(event_names(&bodies[1]), vec!["b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_rearmed_after_explicit_flush() {
        let server = MockServer::start().await;
        mount_track_ok(&server).await;
        let client = LotusClient::new(timed_options(&server, 100, INTERVAL)).unwrap();

        client.track(TrackEvent::new("a", "c")).unwrap();
        client.flush().await.unwrap();
        assert!(!client.has_pending_timer());

        client.track(TrackEvent::new("b", "c")).unwrap();
        assert!(client.has_pending_timer());
        idle(&client).await;

        let bodies = track_bodies(&server).await;
        assert_eq!(bodies.len(), 2);
        assert_eq!(event_names(&bodies[0]), vec!["a"]);
        assert_eq!(event_names(&bodies[1]), vec!["b"]);
        assert!(!client.has_pending_timer());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_rearmed_after_size_flush() {
        let server = MockServer::start().await;
        mount_track_ok(&server).await;
        let client = LotusClient::new(timed_options(&server, 2, INTERVAL)).unwrap();

        client.track(TrackEvent::new("a", "c")).unwrap();
        client.track(TrackEvent::new("b", "c")).unwrap();
        client.wait_in_flight().await;
        assert_eq!(client.queue_len(), 0);

        client.track(TrackEvent::new("c", "c")).unwrap();
        assert!(client.has_pending_timer());
        idle(&client).await;

        let bodies = track_bodies(&server).await;
        assert_eq!(bodies.len(), 2);
        assert_eq!(event_names(&bodies[0]), vec!["a", "b"]);
        assert_eq!(event_names(&bodies[1]), vec!["c"]);
        assert!(!client.has_pending_timer());
        assert_eq!(client.queue_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_disables_timer() {
        let server = MockServer::start().await;
        let client = LotusClient::new(timed_options(&server, 100, Duration::ZERO)).unwrap();

        client.track(TrackEvent::new("a", "c")).unwrap();
        assert!(!client.has_pending_timer());

        idle(&client).await;
        assert_eq!(request_count(&server).await, 0);
        assert_eq!(client.queue_len(), 1);
    }
}
