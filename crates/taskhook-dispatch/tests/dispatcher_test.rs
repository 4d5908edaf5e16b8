//! Integration tests for the durable dispatcher.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use serde_json::{json, Value};
use taskhook_core::VerificationScheme;
use taskhook_dispatch::{
    DispatchError, DispatchPayload, DispatcherConfig, DurableDispatcher, QueueLocation,
};
use taskhook_testing::{
    fixtures::API_KEY, TestEnv, WebhookBuilder, CALLBACK_URL, SCENARIO_SECRET, SCENARIO_TENANT,
};

async fn verified_scenario(env: &TestEnv) -> taskhook_core::VerifiedWebhook {
    env.add_tenant(SCENARIO_TENANT, SCENARIO_SECRET, Some("55")).await;
    let webhook = WebhookBuilder::scenario()
        .account(SCENARIO_TENANT)
        .hmac(SCENARIO_SECRET)
        .header("User-Agent", "Rentwise-Hooks/2");

    env.verifier().verify(webhook.envelope()).await.expect("scenario verifies")
}

#[tokio::test]
async fn enqueue_targets_callback_in_configured_queue() {
    let env = TestEnv::new();
    let verified = verified_scenario(&env).await;

    let handle = env.dispatcher().enqueue(&verified).await.unwrap();

    let tasks = env.queue.tasks().await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(
        tasks[0].queue_path,
        "projects/test/locations/us-central1/queues/webhook-processing"
    );
    assert_eq!(tasks[0].target.url, CALLBACK_URL);
    assert!(handle.name.starts_with(&tasks[0].queue_path));
}

#[tokio::test]
async fn payload_round_trips_tenant_headers_and_raw_body() {
    let env = TestEnv::new();
    let verified = verified_scenario(&env).await;

    env.dispatcher().enqueue(&verified).await.unwrap();
    let payload = env.queue.tasks().await[0].payload();

    assert_eq!(payload.account_id, SCENARIO_TENANT);
    assert_eq!(&payload.envelope_headers, verified.envelope().headers());
    assert_eq!(payload.raw_body().unwrap(), *verified.envelope().raw_body());
    assert_eq!(payload.signature, verified.signature());
    assert_eq!(payload.verification_scheme, Some(VerificationScheme::Hmac));
}

#[tokio::test]
async fn payload_carries_tenant_api_context() {
    let env = TestEnv::new();
    let verified = verified_scenario(&env).await;

    let payload = DispatchPayload::from_verified(&verified);

    assert_eq!(
        payload.api_headers.get("Authorization").map(String::as_str),
        Some(format!("Bearer {API_KEY}").as_str())
    );
    assert_eq!(payload.gl_mapping, json!({"deposits": "2100", "refunds": "2110"}));
    assert_eq!(payload.webhook["task"]["taskName"], "Initiation");
    assert_eq!(payload.account_context.get("automatedTasksCategoryId"), Some(&json!("55")));
}

#[tokio::test]
async fn non_json_body_dispatches_null_webhook() {
    let env = TestEnv::new();
    env.add_tenant("acct-9", "s3", None).await;
    let webhook = WebhookBuilder::new("accountId=acct-9").account("acct-9").token("s3");

    let verified = env.verifier().verify(webhook.envelope()).await.unwrap();
    env.dispatcher().enqueue(&verified).await.unwrap();

    let payload = env.queue.tasks().await[0].payload();
    assert_eq!(payload.webhook, Value::Null);
    assert_eq!(payload.raw_body().unwrap().as_ref(), b"accountId=acct-9");
    assert_eq!(payload.verification_scheme, Some(VerificationScheme::Token));
}

#[tokio::test]
async fn queue_failure_is_surfaced_without_retry() {
    let env = TestEnv::new();
    let verified = verified_scenario(&env).await;
    env.queue.fail_with(Some(DispatchError::unavailable("deadline exceeded"))).await;

    let err = env.dispatcher().enqueue(&verified).await.unwrap_err();

    assert!(err.is_retryable());
    assert!(env.queue.is_empty().await);
}

#[tokio::test]
async fn missing_callback_url_is_configuration_error() {
    let env = TestEnv::new();
    let verified = verified_scenario(&env).await;
    let dispatcher = DurableDispatcher::new(Arc::clone(&env.queue) as _, DispatcherConfig {
        queue: QueueLocation {
            project: "p".into(),
            location: "l".into(),
            queue: "q".into(),
        },
        callback_url: String::new(),
    });

    let err = dispatcher.enqueue(&verified).await.unwrap_err();

    assert!(matches!(err, DispatchError::Configuration { .. }));
    assert!(env.queue.is_empty().await);
}
