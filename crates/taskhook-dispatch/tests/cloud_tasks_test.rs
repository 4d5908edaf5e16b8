//! Integration tests for the Cloud Tasks REST client.
//!
//! Runs the client against a wiremock server standing in for the queue API
//! and checks request shape and error classification.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use serde_json::{json, Value};
use taskhook_dispatch::{CloudTasksConfig, CloudTasksQueue, DispatchError, HttpTarget, TaskQueue};
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

const QUEUE_PATH: &str = "projects/acme/locations/us-central1/queues/webhook-processing";

fn client(server: &MockServer, token: Option<&str>) -> CloudTasksQueue {
    CloudTasksQueue::new(CloudTasksConfig {
        base_url: format!("{}/v2", server.uri()),
        auth_token: token.map(str::to_string),
        timeout: Duration::from_secs(5),
    })
    .expect("client builds")
}

#[tokio::test]
async fn creates_task_with_base64_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/v2/{QUEUE_PATH}/tasks")))
        .and(header("authorization", "Bearer queue-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"name": format!("{QUEUE_PATH}/tasks/42")})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let queue = client(&server, Some("queue-token"));
    let target = HttpTarget::json("https://svc.example/tasks/rentwise-webhook");
    let body = Bytes::from_static(br#"{"account_id":"acct-1"}"#);

    let handle = queue.create_task(QUEUE_PATH, &target, body.clone()).await.unwrap();
    assert_eq!(handle.name, format!("{QUEUE_PATH}/tasks/42"));

    let requests = server.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let http_request = &sent["task"]["httpRequest"];

    assert_eq!(http_request["url"], "https://svc.example/tasks/rentwise-webhook");
    assert_eq!(http_request["httpMethod"], "POST");
    assert_eq!(http_request["headers"]["Content-Type"], "application/json");

    let encoded = http_request["body"].as_str().unwrap();
    assert_eq!(STANDARD.decode(encoded).unwrap(), body.to_vec());
}

#[tokio::test]
async fn server_error_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend overloaded"))
        .mount(&server)
        .await;

    let err = client(&server, None)
        .create_task(QUEUE_PATH, &HttpTarget::json("https://svc"), Bytes::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Unavailable { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn client_error_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
        .mount(&server)
        .await;

    let err = client(&server, None)
        .create_task(QUEUE_PATH, &HttpTarget::json("https://svc"), Bytes::new())
        .await
        .unwrap_err();

    assert_eq!(err, DispatchError::Rejected { status: 403, body: "permission denied".into() });
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn throttling_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(429)).mount(&server).await;

    let err = client(&server, None)
        .create_task(QUEUE_PATH, &HttpTarget::json("https://svc"), Bytes::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Rejected { status: 429, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn unreachable_queue_is_unavailable() {
    let queue = CloudTasksQueue::new(CloudTasksConfig {
        base_url: "http://127.0.0.1:1".into(),
        auth_token: None,
        timeout: Duration::from_millis(500),
    })
    .unwrap();

    let err = queue
        .create_task(QUEUE_PATH, &HttpTarget::json("https://svc"), Bytes::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Unavailable { .. }));
}
