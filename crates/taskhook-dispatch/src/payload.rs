//! Transport schema for durably dispatched webhooks.
//!
//! A [`DispatchPayload`] is what crosses the process boundary between the
//! ingress side and the processing callback. It carries everything the
//! processor needs without re-resolving the tenant: the upstream API headers,
//! the tenant's ledger mapping, the parsed webhook, and enough of the original
//! envelope (headers, base64 raw body, signature, scheme) to reconstruct it.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use taskhook_core::{Metadata, VerificationScheme, VerifiedWebhook};
use thiserror::Error;

/// Keys every callback payload must carry.
pub const REQUIRED_KEYS: &[&str] = &["account_id", "api_headers", "gl_mapping", "webhook"];

/// Reasons a callback body cannot be accepted as a [`DispatchPayload`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// Body is not valid JSON.
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),

    /// Body is JSON but not an object.
    #[error("payload must be a JSON object")]
    NotAnObject,

    /// A required key is absent.
    #[error("payload is missing required key `{0}`")]
    MissingKey(&'static str),

    /// A field has the wrong shape.
    #[error("payload field has wrong shape: {0}")]
    InvalidField(String),

    /// The embedded raw body is not valid base64.
    #[error("raw body is not valid base64: {0}")]
    InvalidRawBody(String),
}

/// Durable-dispatch payload delivered to the processing callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchPayload {
    /// Tenant the webhook was verified for.
    pub account_id: String,

    /// Headers for calling the upstream API as this tenant.
    pub api_headers: BTreeMap<String, String>,

    /// Tenant-specific ledger mapping handed to handlers.
    pub gl_mapping: Value,

    /// Parsed webhook body; `null` when the body was not JSON.
    pub webhook: Value,

    /// Tenant metadata at verification time.
    #[serde(default)]
    pub account_context: Metadata,

    /// Original request headers, lower-cased names.
    #[serde(default)]
    pub envelope_headers: BTreeMap<String, String>,

    /// Original request body, base64 (standard alphabet, padded).
    #[serde(default)]
    pub raw_body_b64: String,

    /// Signature header value that verified.
    #[serde(default)]
    pub signature: String,

    /// Scheme the signature verified with.
    #[serde(default)]
    pub verification_scheme: Option<VerificationScheme>,
}

impl DispatchPayload {
    /// Builds the transport payload for a verified webhook.
    pub fn from_verified(webhook: &VerifiedWebhook) -> Self {
        let context = webhook.context();
        let envelope = webhook.envelope();

        Self {
            account_id: webhook.tenant_id().to_string(),
            api_headers: context.api_headers(),
            gl_mapping: context.gl_mapping(),
            webhook: envelope.parsed_body().cloned().unwrap_or(Value::Null),
            account_context: context.metadata().clone(),
            envelope_headers: envelope.headers().clone(),
            raw_body_b64: STANDARD.encode(envelope.raw_body()),
            signature: webhook.signature().to_string(),
            verification_scheme: Some(webhook.scheme()),
        }
    }

    /// Parses and shape-checks a callback body.
    ///
    /// # Errors
    ///
    /// Returns a [`PayloadError`] if the body is not a JSON object carrying
    /// every key in [`REQUIRED_KEYS`] with the expected types.
    pub fn from_json_slice(body: &[u8]) -> Result<Self, PayloadError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| PayloadError::InvalidJson(e.to_string()))?;

        let object = value.as_object().ok_or(PayloadError::NotAnObject)?;
        if let Some(missing) = REQUIRED_KEYS.iter().find(|key| !object.contains_key(**key)) {
            return Err(PayloadError::MissingKey(missing));
        }

        serde_json::from_value(value).map_err(|e| PayloadError::InvalidField(e.to_string()))
    }

    /// Encodes the payload as a JSON body.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if encoding fails.
    pub fn to_json_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// The webhook body as a JSON object, if it is one.
    pub fn webhook_object(&self) -> Option<&serde_json::Map<String, Value>> {
        self.webhook.as_object()
    }

    /// Decodes the original raw request body.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRawBody` if the field is not valid base64.
    pub fn raw_body(&self) -> Result<Bytes, PayloadError> {
        STANDARD
            .decode(self.raw_body_b64.as_bytes())
            .map(Bytes::from)
            .map_err(|e| PayloadError::InvalidRawBody(e.to_string()))
    }
}
