//! Tenant metadata and secret resolution.
//!
//! Resolves a tenant id into a [`TenantContext`] by reading the tenant's
//! metadata document and dereferencing its two secret references. Nothing is
//! cached: every call performs fresh store round-trips so that a rotated
//! secret takes effect on the next request.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::{
    error::{Result, TaskhookError},
    metadata::{self, API_CREDENTIAL_REF_KEYS, WEBHOOK_SECRET_REF_KEYS},
    models::{TenantContext, TenantId},
    stores::{MetadataStore, SecretStore, StoreError},
};

/// Default metadata namespace tenant documents live under.
pub const DEFAULT_NAMESPACE: &str = "accounts";

/// Resolves tenant ids into fully populated [`TenantContext`]s.
#[derive(Debug, Clone)]
pub struct TenantResolver {
    metadata: Arc<dyn MetadataStore>,
    secrets: Arc<dyn SecretStore>,
    namespace: String,
}

impl TenantResolver {
    /// Creates a resolver over the given stores and metadata namespace.
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        secrets: Arc<dyn SecretStore>,
        namespace: impl Into<String>,
    ) -> Self {
        Self { metadata, secrets, namespace: namespace.into() }
    }

    /// Namespace tenant metadata is read from.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Resolves `tenant_id` into its metadata and secret values.
    ///
    /// # Errors
    ///
    /// - `Client` if `tenant_id` is empty
    /// - `NotFound` if the tenant has no metadata document
    /// - `Config` if a secret reference is missing, unknown, or not UTF-8
    /// - `Unavailable` if either store fails transiently
    #[instrument(name = "resolve_tenant", skip(self), fields(namespace = %self.namespace))]
    pub async fn resolve(&self, tenant_id: &str) -> Result<TenantContext> {
        if tenant_id.trim().is_empty() {
            return Err(TaskhookError::client("tenant id is empty"));
        }

        let metadata = self.metadata.get(&self.namespace, tenant_id).await.map_err(|err| {
            match err {
                StoreError::NotFound(_) => {
                    TaskhookError::NotFound { tenant_id: tenant_id.to_string() }
                },
                StoreError::Unavailable(message) => {
                    warn!(error = %message, "Metadata store unavailable");
                    TaskhookError::Unavailable(message)
                },
                StoreError::Invalid(message) => {
                    TaskhookError::config(format!("tenant metadata unreadable: {message}"))
                },
            }
        })?;

        let credential_ref = metadata::first_scalar(&metadata, API_CREDENTIAL_REF_KEYS)
            .ok_or_else(|| TaskhookError::config("missing API credential secret reference"))?;
        let webhook_secret_ref = metadata::first_scalar(&metadata, WEBHOOK_SECRET_REF_KEYS)
            .ok_or_else(|| TaskhookError::config("missing webhook secret reference"))?;

        let api_credential = self.resolve_secret(&credential_ref).await?;
        let webhook_secret = self.resolve_secret(&webhook_secret_ref).await?;

        debug!("Tenant context resolved");

        Ok(TenantContext::new(TenantId::from(tenant_id), metadata, api_credential, webhook_secret))
    }

    async fn resolve_secret(&self, secret_ref: &str) -> Result<String> {
        let payload = self.secrets.resolve(secret_ref).await.map_err(|err| match err {
            StoreError::NotFound(_) => {
                TaskhookError::config(format!("secret reference {secret_ref} not found"))
            },
            StoreError::Unavailable(message) => {
                warn!(secret_ref, error = %message, "Secret store unavailable");
                TaskhookError::Unavailable(message)
            },
            StoreError::Invalid(message) => TaskhookError::config(message),
        })?;

        String::from_utf8(payload)
            .map_err(|_| TaskhookError::config(format!("secret {secret_ref} is not valid UTF-8")))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::stores::Metadata;

    #[derive(Debug, Default)]
    struct FixedMetadata {
        docs: HashMap<String, Metadata>,
        unavailable: bool,
    }

    #[async_trait]
    impl MetadataStore for FixedMetadata {
        async fn get(
            &self,
            _namespace: &str,
            tenant_id: &str,
        ) -> std::result::Result<Metadata, StoreError> {
            if self.unavailable {
                return Err(StoreError::Unavailable("deadline exceeded".into()));
            }
            self.docs.get(tenant_id).cloned().ok_or_else(|| StoreError::NotFound(tenant_id.into()))
        }
    }

    #[derive(Debug, Default)]
    struct FixedSecrets {
        values: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl SecretStore for FixedSecrets {
        async fn resolve(&self, secret_ref: &str) -> std::result::Result<Vec<u8>, StoreError> {
            self.values
                .get(secret_ref)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(secret_ref.into()))
        }
    }

    fn resolver(doc: serde_json::Value, secrets: &[(&str, Vec<u8>)]) -> TenantResolver {
        let mut docs = HashMap::new();
        docs.insert("acct-1".to_string(), doc.as_object().cloned().unwrap_or_default());
        let values =
            secrets.iter().map(|(name, value)| ((*name).to_string(), value.clone())).collect();

        TenantResolver::new(
            Arc::new(FixedMetadata { docs, unavailable: false }),
            Arc::new(FixedSecrets { values }),
            DEFAULT_NAMESPACE,
        )
    }

    #[tokio::test]
    async fn resolves_both_secrets() {
        let resolver = resolver(
            json!({"apiKeySecret": "api-ref", "webhook_secret": "hook-ref"}),
            &[("api-ref", b"api-value".to_vec()), ("hook-ref", b"hook-value".to_vec())],
        );

        let context = resolver.resolve("acct-1").await.unwrap();

        assert_eq!(context.tenant_id().as_str(), "acct-1");
        assert_eq!(context.api_credential(), "api-value");
        assert_eq!(context.webhook_secret(), "hook-value");
    }

    #[tokio::test]
    async fn empty_tenant_id_is_client_error() {
        let resolver = resolver(json!({}), &[]);
        let err = resolver.resolve("").await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn unknown_tenant_is_not_found() {
        let resolver = resolver(json!({}), &[]);
        let err = resolver.resolve("acct-404").await.unwrap_err();
        assert_eq!(err, TaskhookError::NotFound { tenant_id: "acct-404".into() });
    }

    #[tokio::test]
    async fn metadata_outage_is_unavailable() {
        let resolver = TenantResolver::new(
            Arc::new(FixedMetadata { docs: HashMap::new(), unavailable: true }),
            Arc::new(FixedSecrets::default()),
            DEFAULT_NAMESPACE,
        );

        let err = resolver.resolve("acct-1").await.unwrap_err();
        assert_eq!(err.status_code(), 503);
    }

    #[tokio::test]
    async fn missing_reference_is_config_error() {
        let resolver = resolver(json!({"apiKeySecret": "api-ref"}), &[("api-ref", b"v".to_vec())]);
        let err = resolver.resolve("acct-1").await.unwrap_err();
        assert!(matches!(err, TaskhookError::Config(ref m) if m.contains("webhook secret")));
    }

    #[tokio::test]
    async fn dangling_reference_is_config_error() {
        let resolver = resolver(json!({"apiKeySecret": "api-ref", "webhookSecret": "gone"}), &[(
            "api-ref",
            b"v".to_vec(),
        )]);
        let err = resolver.resolve("acct-1").await.unwrap_err();
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn non_utf8_secret_is_config_error() {
        let resolver = resolver(
            json!({"apiKeySecret": "api-ref", "webhookSecret": "hook-ref"}),
            &[("api-ref", b"v".to_vec()), ("hook-ref", vec![0xff, 0xfe])],
        );
        let err = resolver.resolve("acct-1").await.unwrap_err();
        assert!(matches!(err, TaskhookError::Config(ref m) if m.contains("UTF-8")));
    }
}
