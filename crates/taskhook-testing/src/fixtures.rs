//! Webhook builders, signing helpers and tenant fixtures.

use bytes::Bytes;
use serde_json::{json, Value};
use taskhook_core::{crypto, Metadata, WebhookEnvelope};

/// Provider slug used throughout the tests.
pub const PROVIDER: &str = "rentwise";

/// Tenant of the reference initiation scenario.
pub const SCENARIO_TENANT: &str = "acct-123";

/// Webhook secret of the reference initiation scenario.
pub const SCENARIO_SECRET: &str = "secret";

/// Raw body of the reference initiation scenario.
pub const SCENARIO_BODY: &str = concat!(
    r#"{"eventType":"TaskCreated","#,
    r#""task":{"taskName":"Initiation","taskCategoryName":"General","taskId":101}}"#,
);

/// API credential every fixture tenant gets.
pub const API_KEY: &str = "api-key-value";

/// Secret reference of a tenant's webhook secret.
pub fn webhook_secret_ref(tenant_id: &str) -> String {
    format!("projects/test/secrets/{tenant_id}-webhook/versions/latest")
}

/// Secret reference of a tenant's API credential.
pub fn api_key_ref(tenant_id: &str) -> String {
    format!("projects/test/secrets/{tenant_id}-api-key/versions/latest")
}

/// Metadata document for `tenant_id`, optionally with an automated-tasks
/// category.
pub fn tenant_metadata(tenant_id: &str, category_id: Option<&str>) -> Metadata {
    let mut doc = json!({
        "apiKeySecret": api_key_ref(tenant_id),
        "webhookSecret": webhook_secret_ref(tenant_id),
        "glMapping": {"deposits": "2100", "refunds": "2110"},
    });
    if let Some(category_id) = category_id {
        doc["automatedTasksCategoryId"] = Value::String(category_id.to_string());
    }
    doc.as_object().cloned().unwrap_or_default()
}

/// `sha256=<hex>` signature of `body` under `secret`.
///
/// # Panics
///
/// Never in practice: HMAC accepts keys of any length.
#[allow(clippy::expect_used)]
pub fn hmac_signature(body: &[u8], secret: &str) -> String {
    let digest = crypto::generate_hmac_hex(body, secret).expect("HMAC accepts any key");
    format!("sha256={digest}")
}

/// Task webhook body for `event_type` and `task_name`.
pub fn task_webhook(event_type: &str, task_name: &str, category_id: Option<&str>) -> Value {
    let mut task = json!({"taskId": 101, "taskName": task_name, "taskCategoryName": "General"});
    if let Some(category_id) = category_id {
        task["taskCategoryId"] = Value::String(category_id.to_string());
    }
    json!({"eventType": event_type, "task": task})
}

/// Builder for inbound webhook requests.
#[derive(Debug, Clone)]
pub struct WebhookBuilder {
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl WebhookBuilder {
    /// Request with a raw body and no headers.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self { headers: Vec::new(), body: body.into() }
    }

    /// Request with a JSON body.
    pub fn json(body: &Value) -> Self {
        Self::new(body.to_string())
    }

    /// The reference initiation scenario body.
    pub fn scenario() -> Self {
        Self::new(SCENARIO_BODY)
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds the provider account-id header.
    #[must_use]
    pub fn account(self, tenant_id: &str) -> Self {
        self.header(format!("x-{PROVIDER}-account-id"), tenant_id)
    }

    /// Signs the current body with `secret` in the provider HMAC header.
    #[must_use]
    pub fn hmac(self, secret: &str) -> Self {
        let signature = hmac_signature(&self.body, secret);
        self.header(format!("x-{PROVIDER}-hmac-sha256"), signature)
    }

    /// Adds the provider static-token header.
    #[must_use]
    pub fn token(self, token: &str) -> Self {
        self.header(format!("x-{PROVIDER}-webhook-token"), token)
    }

    /// Headers added so far.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Request body.
    pub fn body(&self) -> Bytes {
        self.body.clone()
    }

    /// Captures the request as ingress would.
    pub fn envelope(&self) -> WebhookEnvelope {
        WebhookEnvelope::capture(self.headers.iter().cloned(), self.body.clone())
    }
}
