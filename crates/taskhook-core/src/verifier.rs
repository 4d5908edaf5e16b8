//! Webhook authentication against per-tenant secrets.
//!
//! Verification runs in four steps:
//!
//! 1. **Tenant id** - evaluated as an ordered list of [`TenantIdProbe`]s over
//!    headers, top-level body fields, and the nested `account` object. When
//!    the body did not parse at ingress, the body probes run against a
//!    tolerant re-parse of the raw bytes.
//! 2. **Signature** - evaluated as an ordered list of [`SignatureProbe`]s:
//!    every HMAC-style header first, then every static-token header.
//! 3. **Resolution** - the tenant's context and webhook secret are resolved
//!    fresh through the [`TenantResolver`].
//! 4. **Comparison** - HMAC-SHA256 over the exact raw body, or token equality.
//!
//! A request with no tenant id fails before any signature or store work.

use std::borrow::Cow;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::{
    crypto::{self, SignatureError},
    error::{Result, TaskhookError},
    metadata::scalar_to_string,
    models::{VerificationScheme, VerifiedWebhook, WebhookEnvelope},
    resolver::TenantResolver,
};

/// Headers that may carry the tenant id, in probe order.
pub const TENANT_HEADERS: &[&str] = &["x-account-id", "x-tenant-id", "account-id"];

/// Top-level body fields that may carry the tenant id, in probe order.
pub const TENANT_BODY_FIELDS: &[&str] =
    &["accountId", "account_id", "AccountId", "tenantId", "tenant_id"];

/// Fields of the nested `account` object that may carry the tenant id.
pub const TENANT_ACCOUNT_FIELDS: &[&str] = &["id", "accountId", "account_id", "Id"];

/// HMAC-style signature headers, in probe order.
pub const HMAC_HEADERS: &[&str] =
    &["x-hmac-sha256", "x-webhook-signature", "x-signature-256", "x-signature"];

/// Static-token headers, in probe order.
pub const TOKEN_HEADERS: &[&str] = &["x-webhook-token", "x-webhook-secret", "x-auth-token"];

/// One way of locating the tenant id on an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantIdProbe {
    /// A request header, matched case-insensitively.
    Header(String),
    /// A top-level field of the JSON body.
    BodyField(String),
    /// A field of the body's nested `account` object.
    AccountField(String),
}

impl TenantIdProbe {
    /// Applies this probe to `envelope`, using `body` as the JSON view.
    fn extract(&self, envelope: &WebhookEnvelope, body: Option<&Value>) -> Option<String> {
        match self {
            Self::Header(name) => envelope
                .header(name)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            Self::BodyField(field) => body?.get(field).and_then(scalar_to_string),
            Self::AccountField(field) => {
                body?.get("account")?.as_object()?.get(field).and_then(scalar_to_string)
            },
        }
    }
}

/// One header that may carry a signature, and the scheme it implies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureProbe {
    /// Header name, matched case-insensitively.
    pub header: String,
    /// Scheme used to check the header's value.
    pub scheme: VerificationScheme,
}

/// Ordered probe lists used by the verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierConfig {
    /// Tenant id probes, evaluated first to last.
    pub tenant_probes: Vec<TenantIdProbe>,
    /// Signature probes, evaluated first to last.
    pub signature_probes: Vec<SignatureProbe>,
}

impl VerifierConfig {
    /// Probe lists for `provider`, with provider-specific headers ahead of the
    /// generic ones.
    ///
    /// For provider `rentwise` the first tenant header is
    /// `x-rentwise-account-id`, the first HMAC header is
    /// `x-rentwise-hmac-sha256`, and the first token header is
    /// `x-rentwise-webhook-token`.
    pub fn for_provider(provider: &str) -> Self {
        let provider = provider.trim().to_ascii_lowercase();

        let tenant_headers = [format!("x-{provider}-account-id")]
            .into_iter()
            .chain(TENANT_HEADERS.iter().map(|h| (*h).to_string()));
        let hmac_headers = [format!("x-{provider}-hmac-sha256"), format!("x-{provider}-signature")]
            .into_iter()
            .chain(HMAC_HEADERS.iter().map(|h| (*h).to_string()));
        let token_headers = [format!("x-{provider}-webhook-token")]
            .into_iter()
            .chain(TOKEN_HEADERS.iter().map(|h| (*h).to_string()));

        let tenant_probes = tenant_headers
            .map(TenantIdProbe::Header)
            .chain(TENANT_BODY_FIELDS.iter().map(|f| TenantIdProbe::BodyField((*f).to_string())))
            .chain(
                TENANT_ACCOUNT_FIELDS.iter().map(|f| TenantIdProbe::AccountField((*f).to_string())),
            )
            .collect();

        let signature_probes = hmac_headers
            .map(|header| SignatureProbe { header, scheme: VerificationScheme::Hmac })
            .chain(token_headers.map(|header| SignatureProbe {
                header,
                scheme: VerificationScheme::Token,
            }))
            .collect();

        Self { tenant_probes, signature_probes }
    }

    /// Finds the tenant id on `envelope`, first matching probe wins.
    pub fn extract_tenant_id(&self, envelope: &WebhookEnvelope) -> Option<String> {
        let body = body_view(envelope);
        self.tenant_probes.iter().find_map(|probe| probe.extract(envelope, body.as_deref()))
    }

    /// Finds the signature header, first present probe wins.
    pub fn extract_signature<'a>(
        &self,
        envelope: &'a WebhookEnvelope,
    ) -> Option<(&'a str, VerificationScheme)> {
        self.signature_probes.iter().find_map(|probe| {
            envelope
                .header(&probe.header)
                .filter(|value| !value.trim().is_empty())
                .map(|value| (value, probe.scheme))
        })
    }
}

/// JSON view of the body: the ingress parse if present, else a tolerant
/// re-parse of the raw bytes.
fn body_view(envelope: &WebhookEnvelope) -> Option<Cow<'_, Value>> {
    if let Some(parsed) = envelope.parsed_body() {
        return Some(Cow::Borrowed(parsed));
    }

    let raw = envelope.raw_body().as_ref();
    let raw = raw.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(raw);
    serde_json::from_slice(raw.trim_ascii()).ok().map(Cow::Owned)
}

/// Authenticates webhook envelopes.
#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    resolver: TenantResolver,
    config: VerifierConfig,
}

impl WebhookVerifier {
    /// Creates a verifier resolving tenants through `resolver`.
    pub fn new(resolver: TenantResolver, config: VerifierConfig) -> Self {
        Self { resolver, config }
    }

    /// Probe configuration in use.
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Authenticates `envelope` and returns proof of verification.
    ///
    /// # Errors
    ///
    /// - `Client` when no tenant id can be found
    /// - `Auth` when no signature header is present, the algorithm is not
    ///   SHA-256, or the signature does not match
    /// - `Config` when the tenant's webhook secret is empty
    /// - any error from tenant resolution
    #[instrument(
        name = "verify_webhook",
        skip_all,
        fields(tenant_id = tracing::field::Empty, scheme = tracing::field::Empty)
    )]
    pub async fn verify(&self, envelope: WebhookEnvelope) -> Result<VerifiedWebhook> {
        let tenant_id = self.config.extract_tenant_id(&envelope).ok_or_else(|| {
            TaskhookError::client("no tenant id found in headers or body")
        })?;
        tracing::Span::current().record("tenant_id", tenant_id.as_str());

        // Tokens compare byte for byte; HMAC headers are normalized by the parser.
        let (signature, scheme) = self
            .config
            .extract_signature(&envelope)
            .map(|(value, scheme)| (value.to_string(), scheme))
            .ok_or_else(|| TaskhookError::auth("missing signature header"))?;
        tracing::Span::current().record("scheme", scheme.as_str());

        let context = self.resolver.resolve(&tenant_id).await?;

        if context.webhook_secret().is_empty() {
            return Err(TaskhookError::config("webhook secret is empty"));
        }

        let outcome = match scheme {
            VerificationScheme::Hmac => {
                crypto::verify_hmac(envelope.raw_body(), &signature, context.webhook_secret())
            },
            VerificationScheme::Token => crypto::verify_token(&signature, context.webhook_secret()),
        };

        if let Err(err) = outcome {
            warn!(error = %err, "Webhook signature rejected");
            return Err(match err {
                SignatureError::InvalidSecret => TaskhookError::config(err.to_string()),
                other => TaskhookError::auth(other.to_string()),
            });
        }

        debug!("Webhook verified");
        Ok(VerifiedWebhook::new(context, envelope, signature, scheme))
    }
}
