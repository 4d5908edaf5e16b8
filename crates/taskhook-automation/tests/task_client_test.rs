//! Integration tests for the HTTP Task API client.

#![allow(clippy::unwrap_used)]

use std::{collections::BTreeMap, time::Duration};

use serde_json::json;
use taskhook_automation::{HttpTaskDetailClient, TaskDetail, TaskDetailApi, UpstreamError};
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn headers() -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert("Authorization".to_string(), "Bearer tenant-key".to_string());
    headers.insert("X-Account-Id".to_string(), "acct-1".to_string());
    headers
}

fn client(server: &MockServer) -> HttpTaskDetailClient {
    HttpTaskDetailClient::new(server.uri(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn fetches_task_with_tenant_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tasks/101"))
        .and(header("authorization", "Bearer tenant-key"))
        .and(header("x-account-id", "acct-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "title": "Move Out",
            "category": {"name": "Automations", "id": 55}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let detail = client(&server).get_task("101", &headers()).await.unwrap();

    assert_eq!(
        detail,
        Some(TaskDetail {
            title: Some("Move Out".into()),
            category_name: Some("Automations".into()),
            category_id: Some("55".into()),
        })
    );
}

#[tokio::test]
async fn missing_task_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(404)).mount(&server).await;

    assert_eq!(client(&server).get_task("999", &headers()).await, Ok(None));
}

#[tokio::test]
async fn empty_body_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

    assert_eq!(client(&server).get_task("101", &headers()).await, Ok(None));
}

#[tokio::test]
async fn server_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

    let err = client(&server).get_task("101", &headers()).await.unwrap_err();
    assert_eq!(err, UpstreamError::Status { status: 500 });
}

#[tokio::test]
async fn garbage_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = client(&server).get_task("101", &headers()).await.unwrap_err();
    assert!(matches!(err, UpstreamError::Decode(_)));
}
