use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use eventline_ingest::{IngestionService, MemoryPublisher, PublishError, Publisher, WireMessage};
use eventline_metrics::{MemoryMetricsRepository, MetricsAggregationService};
use eventline_server::{app, AppState, DEFAULT_MAX_BODY_BYTES};
use serde_json::{json, Value};
use tower::ServiceExt; // for oneshot

fn app_with(publisher: Arc<dyn Publisher>, max_batch_size: usize) -> Router {
    let state = AppState {
        ingestion: Arc::new(IngestionService::new(publisher)),
        metrics: Arc::new(MetricsAggregationService::new(Arc::new(
            MemoryMetricsRepository::default(),
        ))),
        readiness: Vec::new(),
        max_batch_size,
        max_body_bytes: DEFAULT_MAX_BODY_BYTES,
    };
    app(state)
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn signup(user_id: &str) -> Value {
    json!({
        "event_name": "signup",
        "channel": "web",
        "user_id": user_id,
        "timestamp": 1_700_000_000,
        "tags": ["organic"],
        "metadata": {"plan": "pro", "seats": 3}
    })
}

#[tokio::test]
async fn single_event_is_accepted_and_published() {
    let publisher = Arc::new(MemoryPublisher::new());
    let (status, body) = post_json(app_with(publisher.clone(), 10), "/events", signup("u1")).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({"status": "accepted"}));

    let records = publisher.published();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, "6905618824879433831");
    let message = records[0].message().unwrap();
    assert_eq!(message.metadata, r#"{"plan":"pro","seats":3}"#);
}

#[tokio::test]
async fn null_tags_and_metadata_are_accepted() {
    let publisher = Arc::new(MemoryPublisher::new());
    let mut event = signup("u1");
    event["tags"] = Value::Null;
    event["metadata"] = Value::Null;
    let (status, _) = post_json(app_with(publisher.clone(), 10), "/events", event).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let message = publisher.published()[0].message().unwrap();
    assert!(message.tags.is_empty());
    assert_eq!(message.metadata, "{}");
}

#[tokio::test]
async fn missing_required_field_is_rejected() {
    let publisher = Arc::new(MemoryPublisher::new());
    let event = json!({"event_name": "signup", "timestamp": 1_700_000_000});
    let (status, body) = post_json(app_with(publisher.clone(), 10), "/events", event).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert_eq!(publisher.call_count(), 0);
}

#[tokio::test]
async fn blank_user_id_is_rejected() {
    let publisher = Arc::new(MemoryPublisher::new());
    let (status, body) = post_json(app_with(publisher.clone(), 10), "/events", signup("  ")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("user_id"));
    assert_eq!(publisher.call_count(), 0);
}

#[tokio::test]
async fn unknown_channel_is_rejected() {
    let publisher = Arc::new(MemoryPublisher::new());
    let mut event = signup("u1");
    event["channel"] = json!("fax");
    let (status, _) = post_json(app_with(publisher.clone(), 10), "/events", event).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(publisher.call_count(), 0);
}

#[tokio::test]
async fn broker_failure_is_a_generic_500() {
    let publisher = Arc::new(MemoryPublisher::failing_on_call(0));
    let (status, body) = post_json(app_with(publisher, 10), "/events", signup("u1")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "internal server error");
}

#[tokio::test]
async fn bulk_events_are_published_in_order() {
    let publisher = Arc::new(MemoryPublisher::new());
    let batch = json!({"events": [signup("u1"), signup("u2"), signup("u3")]});
    let (status, body) = post_json(app_with(publisher.clone(), 10), "/events/bulk", batch).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({"status": "accepted", "count": 3}));

    let users: Vec<_> = publisher
        .published()
        .iter()
        .map(|r| r.message().unwrap().user_id)
        .collect();
    assert_eq!(users, vec!["u1", "u2", "u3"]);
}

#[tokio::test]
async fn empty_bulk_is_rejected() {
    let publisher = Arc::new(MemoryPublisher::new());
    let (status, _) =
        post_json(app_with(publisher.clone(), 10), "/events/bulk", json!({"events": []})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(publisher.call_count(), 0);
}

#[tokio::test]
async fn oversized_bulk_is_rejected() {
    let publisher = Arc::new(MemoryPublisher::new());
    let batch = json!({"events": [signup("u1"), signup("u2"), signup("u3")]});
    let (status, body) = post_json(app_with(publisher.clone(), 2), "/events/bulk", batch).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("limit of 2"));
    assert_eq!(publisher.call_count(), 0);
}

#[tokio::test]
async fn invalid_bulk_member_names_its_index() {
    let publisher = Arc::new(MemoryPublisher::new());
    let batch = json!({"events": [signup("u1"), signup(""), signup("u3")]});
    let (status, body) = post_json(app_with(publisher.clone(), 10), "/events/bulk", batch).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("index 1"));
    assert_eq!(publisher.call_count(), 0);
}

#[tokio::test]
async fn bulk_stops_at_first_broker_failure() {
    let publisher = Arc::new(MemoryPublisher::failing_on_call(1));
    let batch = json!({"events": [signup("u1"), signup("u2"), signup("u3")]});
    let (status, _) = post_json(app_with(publisher.clone(), 10), "/events/bulk", batch).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(publisher.call_count(), 2);
    assert_eq!(publisher.published().len(), 1);
}

struct StalledPublisher;

#[async_trait]
impl Publisher for StalledPublisher {
    async fn publish(&self, _message: &WireMessage) -> Result<(), PublishError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn stalled_broker_is_a_gateway_timeout() {
    let state = AppState {
        ingestion: Arc::new(
            IngestionService::new(Arc::new(StalledPublisher))
                .with_deadline(Duration::from_millis(100)),
        ),
        metrics: Arc::new(MetricsAggregationService::new(Arc::new(
            MemoryMetricsRepository::default(),
        ))),
        readiness: Vec::new(),
        max_batch_size: 10,
        max_body_bytes: DEFAULT_MAX_BODY_BYTES,
    };

    let (status, _) = post_json(app(state), "/events", signup("u1")).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let publisher = Arc::new(MemoryPublisher::new());
    let state = AppState {
        ingestion: Arc::new(IngestionService::new(publisher.clone())),
        metrics: Arc::new(MetricsAggregationService::new(Arc::new(
            MemoryMetricsRepository::default(),
        ))),
        readiness: Vec::new(),
        max_batch_size: 10,
        max_body_bytes: 64,
    };
    let body = format!(
        r#"{{"event_name":"signup","user_id":"{}","timestamp":1700000000}}"#,
        "u".repeat(256)
    );

    let response = app(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/events")
                .header("Content-Type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(publisher.call_count(), 0);
}
