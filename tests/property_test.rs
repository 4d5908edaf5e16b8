//! Property-based tests for verification, category gating and payload
//! round-trips.
//!
//! Each property drives the real verifier, dispatcher payload, or processor
//! over the in-memory collaborators from `taskhook-testing`.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use bytes::Bytes;
use proptest::{prelude::*, test_runner::Config as ProptestConfig};
use serde_json::json;
use taskhook_automation::{routing::ROUTES, ProcessOutcome, SkipReason};
use taskhook_core::{TaskhookError, VerificationScheme, WebhookEnvelope};
use taskhook_dispatch::DispatchPayload;
use taskhook_testing::{hmac_signature, TestEnv, WebhookBuilder, PROVIDER};
use tokio::runtime::Runtime;

/// Creates property test configuration based on environment.
///
/// Uses `PROPTEST_CASES` when set, otherwise 32 cases.
fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES").ok().and_then(|s| s.parse().ok()).unwrap_or(32);
    ProptestConfig::with_cases(cases)
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

fn secret() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9]{1,32}"
}

fn tenant_id() -> impl Strategy<Value = String> {
    "acct-[a-z0-9]{1,12}"
}

/// Headers that can never be mistaken for tenant or signature headers.
fn unrelated_headers() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(("x-extra-[a-z]{1,8}", "[ -~]{0,24}"), 0..5)
}

fn hmac_header() -> String {
    format!("x-{PROVIDER}-hmac-sha256")
}

/// Routes other than initiation, as (event type, task name).
fn gated_routes() -> Vec<(&'static str, &'static str)> {
    ROUTES
        .iter()
        .filter(|(_, _, automation)| !automation.is_initiation())
        .map(|(event, task, _)| (event.as_str(), *task))
        .collect()
}

proptest! {
    #![proptest_config(proptest_config())]

    /// Without any tenant id candidate, verification fails as a client error
    /// before any store is consulted.
    #[test]
    fn missing_tenant_id_is_client_error(
        headers in unrelated_headers(),
        fields in prop::collection::btree_map("x_[a-z]{1,8}", "[a-z0-9]{0,8}", 0..5),
        as_json in any::<bool>(),
    ) {
        let env = TestEnv::new();
        let body = if as_json {
            serde_json::to_vec(&fields).unwrap()
        } else {
            fields.keys().cloned().collect::<Vec<_>>().join("&").into_bytes()
        };
        let envelope = WebhookEnvelope::capture(
            headers.into_iter().chain([(hmac_header(), "sha256=00".to_string())]),
            Bytes::from(body),
        );

        let result = runtime().block_on(env.verifier().verify(envelope));

        prop_assert!(matches!(result, Err(TaskhookError::Client(_))));
        prop_assert_eq!(env.metadata.reads(), 0);
    }

    /// A correct HMAC verifies with or without the algorithm prefix, and any
    /// single-byte change to the body or the secret breaks it.
    #[test]
    fn hmac_binds_exact_body_and_secret(
        tenant in tenant_id(),
        secret in secret(),
        body in prop::collection::vec(any::<u8>(), 1..256),
        prefixed in any::<bool>(),
        flip_at in any::<prop::sample::Index>(),
        flip_bit in 0u8..8,
    ) {
        let env = TestEnv::new();
        let signature = hmac_signature(&body, &secret);
        let signature =
            if prefixed { signature } else { signature.trim_start_matches("sha256=").to_string() };
        let sign = |body: Vec<u8>| {
            WebhookBuilder::new(body).account(&tenant).header(hmac_header(), signature.clone())
        };

        let mut tampered = body.clone();
        tampered[flip_at.index(body.len())] ^= 1 << flip_bit;

        let (genuine, tampered_body, rotated) = runtime().block_on(async {
            env.add_tenant(&tenant, &secret, None).await;
            let genuine = env.verifier().verify(sign(body.clone()).envelope()).await;
            let tampered_body = env.verifier().verify(sign(tampered).envelope()).await;
            env.rotate_secret(&tenant, &format!("{secret}x")).await;
            let rotated = env.verifier().verify(sign(body.clone()).envelope()).await;
            (genuine, tampered_body, rotated)
        });

        let verified = genuine.unwrap();
        prop_assert_eq!(verified.scheme(), VerificationScheme::Hmac);
        prop_assert_eq!(verified.tenant_id().as_str(), tenant.as_str());
        prop_assert!(matches!(tampered_body, Err(TaskhookError::Auth(_))));
        prop_assert!(matches!(rotated, Err(TaskhookError::Auth(_))));
    }

    /// Token verification succeeds exactly when the header equals the secret,
    /// byte for byte, including surrounding whitespace.
    #[test]
    fn token_requires_exact_equality(
        tenant in tenant_id(),
        secret in "[ \t]{0,2}[a-zA-Z0-9]{1,30}[ \t]{0,2}",
        candidate in "[a-zA-Z0-9]{1,32}",
        padding in prop::sample::select(vec!["", " ", "\t", " \t"]),
        pad_left in any::<bool>(),
    ) {
        let env = TestEnv::new();
        let webhook = |token: &str| WebhookBuilder::new("{}").account(&tenant).token(token);
        let padded =
            if pad_left { format!("{padding}{secret}") } else { format!("{secret}{padding}") };

        let (exact, padded_result, other) = runtime().block_on(async {
            env.add_tenant(&tenant, &secret, None).await;
            let exact = env.verifier().verify(webhook(&secret).envelope()).await;
            let padded_result = env.verifier().verify(webhook(&padded).envelope()).await;
            let other = env.verifier().verify(webhook(&candidate).envelope()).await;
            (exact, padded_result, other)
        });

        prop_assert_eq!(exact.unwrap().scheme(), VerificationScheme::Token);
        prop_assert_eq!(padded_result.is_ok(), padding.is_empty());
        prop_assert_eq!(other.is_ok(), candidate == secret);
    }

    /// A task outside the tenant's automated-tasks category never reaches a
    /// gated handler.
    #[test]
    fn category_mismatch_never_routes(
        route in prop::sample::select(gated_routes()),
        tenant_category in "[0-9]{1,4}",
        task_category in "[0-9]{1,4}",
    ) {
        prop_assume!(tenant_category != task_category);
        let env = TestEnv::new();
        let (event_type, task_name) = route;
        let payload = DispatchPayload::from_json_slice(
            json!({
                "account_id": "acct-1",
                "api_headers": {},
                "gl_mapping": {},
                "account_context": {"automatedTasksCategoryId": tenant_category},
                "webhook": {
                    "eventType": event_type,
                    "task": {"taskId": 7, "taskName": task_name, "taskCategoryId": task_category},
                },
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap();

        let (outcome, invocations) = runtime().block_on(async {
            let outcome = env.processor().process(&payload).await;
            (outcome, env.handler.count().await)
        });

        prop_assert_eq!(outcome, Ok(ProcessOutcome::Skipped(SkipReason::CategoryMismatch)));
        prop_assert_eq!(invocations, 0);
    }

    /// The dispatch payload reproduces tenant id, headers and raw body bytes.
    #[test]
    fn dispatch_payload_round_trips(
        tenant in tenant_id(),
        secret in secret(),
        headers in unrelated_headers(),
        body in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let env = TestEnv::new();
        let signed = WebhookBuilder::new(body.clone()).account(&tenant).token(&secret);
        let webhook = headers.into_iter().fold(signed, |webhook, (name, value)| {
            webhook.header(name, value)
        });

        let verified = runtime().block_on(async {
            env.add_tenant(&tenant, &secret, None).await;
            env.verifier().verify(webhook.envelope()).await
        })
        .unwrap();

        let encoded = DispatchPayload::from_verified(&verified).to_json_vec().unwrap();
        let decoded = DispatchPayload::from_json_slice(&encoded).unwrap();

        prop_assert_eq!(decoded.account_id.as_str(), verified.tenant_id().as_str());
        prop_assert_eq!(&decoded.envelope_headers, verified.envelope().headers());
        let raw_body = decoded.raw_body().unwrap();
        prop_assert_eq!(raw_body.as_ref(), body.as_slice());
    }
}
