//! Core domain models for the webhook pipeline.
//!
//! Defines the raw captured request ([`WebhookEnvelope`]), the per-tenant
//! configuration resolved for each request ([`TenantContext`]), and the
//! proof-of-verification type ([`VerifiedWebhook`]) that is the only input the
//! durable dispatcher accepts.

use std::{collections::BTreeMap, fmt};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{
    metadata::{self, AUTOMATED_TASKS_CATEGORY_KEYS, GL_MAPPING_KEYS},
    stores::Metadata,
};

/// Tenant (upstream account) identifier.
///
/// Tenant ids are opaque strings owned by the upstream platform, e.g.
/// `"acct-123"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TenantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Per-tenant configuration and resolved credentials.
///
/// Built fresh by the resolver on every verification and processing cycle;
/// never cached or persisted by this layer.
#[derive(Clone, PartialEq)]
pub struct TenantContext {
    tenant_id: TenantId,
    metadata: Metadata,
    api_credential: String,
    webhook_secret: String,
}

impl TenantContext {
    /// Creates a tenant context from already-resolved parts.
    pub fn new(
        tenant_id: TenantId,
        metadata: Metadata,
        api_credential: impl Into<String>,
        webhook_secret: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id,
            metadata,
            api_credential: api_credential.into(),
            webhook_secret: webhook_secret.into(),
        }
    }

    /// Tenant this context belongs to.
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Raw tenant metadata document.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Credential used to call the upstream platform API.
    pub fn api_credential(&self) -> &str {
        &self.api_credential
    }

    /// Secret used to authenticate inbound webhooks.
    pub fn webhook_secret(&self) -> &str {
        &self.webhook_secret
    }

    /// Category id whose tasks are eligible for automation, if configured.
    pub fn automated_tasks_category_id(&self) -> Option<String> {
        metadata::first_scalar(&self.metadata, AUTOMATED_TASKS_CATEGORY_KEYS)
    }

    /// Tenant-specific ledger mapping handed to automation handlers.
    ///
    /// Defaults to an empty object when the tenant has none configured.
    pub fn gl_mapping(&self) -> serde_json::Value {
        metadata::first_value(&self.metadata, GL_MAPPING_KEYS)
            .cloned()
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()))
    }

    /// Request headers for calling the upstream API on behalf of this tenant.
    pub fn api_headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), format!("Bearer {}", self.api_credential));
        headers.insert("Accept".to_string(), "application/json".to_string());
        headers.insert("X-Account-Id".to_string(), self.tenant_id.to_string());
        headers
    }
}

impl fmt::Debug for TenantContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantContext")
            .field("tenant_id", &self.tenant_id)
            .field("metadata_keys", &self.metadata.keys().collect::<Vec<_>>())
            .field("api_credential", &"***")
            .field("webhook_secret", &"***")
            .finish()
    }
}

/// Raw captured webhook request prior to verification.
///
/// Header names are stored lower-cased so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEnvelope {
    headers: BTreeMap<String, String>,
    raw_body: Bytes,
    parsed_body: Option<serde_json::Value>,
}

impl WebhookEnvelope {
    /// Captures a request, parsing the body as JSON on a best-effort basis.
    ///
    /// A body that is not valid JSON is kept as raw bytes with no parsed
    /// form; it is never rejected here.
    pub fn capture<I, K, V>(headers: I, raw_body: Bytes) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let parsed_body = serde_json::from_slice(&raw_body).ok();
        Self::from_parts(headers, raw_body, parsed_body)
    }

    /// Builds an envelope from explicit parts.
    pub fn from_parts<I, K, V>(
        headers: I,
        raw_body: Bytes,
        parsed_body: Option<serde_json::Value>,
    ) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let headers = headers
            .into_iter()
            .map(|(name, value)| (name.as_ref().to_ascii_lowercase(), value.into()))
            .collect();

        Self { headers, raw_body, parsed_body }
    }

    /// All captured headers, keyed by lower-cased name.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Exact request body bytes as received.
    pub fn raw_body(&self) -> &Bytes {
        &self.raw_body
    }

    /// Parsed JSON body, absent when the body did not parse at ingress.
    pub fn parsed_body(&self) -> Option<&serde_json::Value> {
        self.parsed_body.as_ref()
    }
}

/// How a webhook proved its authenticity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationScheme {
    /// HMAC-SHA256 over the raw body keyed by the webhook secret.
    Hmac,
    /// Static token equal to the webhook secret.
    Token,
}

impl VerificationScheme {
    /// Wire tag for this scheme.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hmac => "hmac",
            Self::Token => "token",
        }
    }
}

impl fmt::Display for VerificationScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A webhook whose signature has been checked against its tenant's secret.
///
/// Only [`crate::verifier::WebhookVerifier`] can construct this type, so
/// holding one is proof that verification succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedWebhook {
    context: TenantContext,
    envelope: WebhookEnvelope,
    signature: String,
    scheme: VerificationScheme,
}

impl VerifiedWebhook {
    pub(crate) fn new(
        context: TenantContext,
        envelope: WebhookEnvelope,
        signature: String,
        scheme: VerificationScheme,
    ) -> Self {
        Self { context, envelope, signature, scheme }
    }

    /// Tenant the webhook was verified for.
    pub fn tenant_id(&self) -> &TenantId {
        self.context.tenant_id()
    }

    /// Resolved tenant context used during verification.
    pub fn context(&self) -> &TenantContext {
        &self.context
    }

    /// Original captured request.
    pub fn envelope(&self) -> &WebhookEnvelope {
        &self.envelope
    }

    /// Signature header value that matched.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Scheme the signature was checked with.
    pub fn scheme(&self) -> VerificationScheme {
        self.scheme
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn metadata(value: serde_json::Value) -> Metadata {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn envelope_parses_json_body() {
        let envelope = WebhookEnvelope::capture(
            [("Content-Type", "application/json")],
            Bytes::from_static(br#"{"eventType":"TaskCreated"}"#),
        );

        assert_eq!(envelope.parsed_body(), Some(&json!({"eventType": "TaskCreated"})));
        assert_eq!(envelope.header("content-type"), Some("application/json"));
        assert_eq!(envelope.header("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn envelope_keeps_unparseable_body() {
        let envelope = WebhookEnvelope::capture(
            Vec::<(String, String)>::new(),
            Bytes::from_static(b"not json"),
        );

        assert!(envelope.parsed_body().is_none());
        assert_eq!(envelope.raw_body().as_ref(), b"not json");
    }

    #[test]
    fn tenant_context_debug_redacts_secrets() {
        let context = TenantContext::new("acct-1".into(), Metadata::new(), "api-key", "hook-key");
        let rendered = format!("{context:?}");

        assert!(!rendered.contains("api-key"));
        assert!(!rendered.contains("hook-key"));
        assert!(rendered.contains("acct-1"));
    }

    #[test]
    fn category_id_accepts_either_spelling_and_numbers() {
        let camel = TenantContext::new(
            "a".into(),
            metadata(json!({"automatedTasksCategoryId": 42})),
            "k",
            "s",
        );
        let snake = TenantContext::new(
            "a".into(),
            metadata(json!({"automated_tasks_category_id": "42"})),
            "k",
            "s",
        );

        assert_eq!(camel.automated_tasks_category_id().as_deref(), Some("42"));
        assert_eq!(snake.automated_tasks_category_id().as_deref(), Some("42"));
    }

    #[test]
    fn gl_mapping_defaults_to_empty_object() {
        let context = TenantContext::new("a".into(), Metadata::new(), "k", "s");
        assert_eq!(context.gl_mapping(), json!({}));
    }

    #[test]
    fn api_headers_carry_bearer_credential() {
        let context = TenantContext::new("acct-9".into(), Metadata::new(), "cred", "s");
        let headers = context.api_headers();

        assert_eq!(headers.get("Authorization").map(String::as_str), Some("Bearer cred"));
        assert_eq!(headers.get("X-Account-Id").map(String::as_str), Some("acct-9"));
    }
}
