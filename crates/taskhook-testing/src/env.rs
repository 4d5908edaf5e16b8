//! In-process pipeline wired entirely from test doubles.

use std::sync::Arc;

use taskhook_automation::{AutomationProcessor, HandlerRegistry};
use taskhook_core::{
    resolver::DEFAULT_NAMESPACE, TenantResolver, VerifierConfig, WebhookVerifier,
};
use taskhook_dispatch::{DispatcherConfig, DurableDispatcher, QueueLocation};

use crate::{
    fixtures::{self, API_KEY, PROVIDER},
    recording::{RecordingHandler, RecordingTaskQueue, StaticTaskDetailApi},
    stores::{InMemoryInitiationLedger, InMemoryMetadataStore, InMemorySecretStore},
};

/// Callback URL the test dispatcher targets.
pub const CALLBACK_URL: &str = "http://127.0.0.1:8080/tasks/rentwise-webhook";

/// Every collaborator of the pipeline as an inspectable double.
///
/// Components built from the same environment share the same doubles, so a
/// tenant added here is visible to the verifier, and a task recorded by the
/// dispatcher can be fed straight to the processor.
#[derive(Debug, Clone)]
pub struct TestEnv {
    /// Tenant metadata documents.
    pub metadata: Arc<InMemoryMetadataStore>,
    /// Secret payloads.
    pub secrets: Arc<InMemorySecretStore>,
    /// Completed-initiation record.
    pub ledger: Arc<InMemoryInitiationLedger>,
    /// Durable queue double.
    pub queue: Arc<RecordingTaskQueue>,
    /// Upstream Task API double.
    pub tasks: Arc<StaticTaskDetailApi>,
    /// Handler registered for every automation.
    pub handler: Arc<RecordingHandler>,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    /// Creates an environment with no tenants.
    pub fn new() -> Self {
        Self {
            metadata: Arc::new(InMemoryMetadataStore::new()),
            secrets: Arc::new(InMemorySecretStore::new()),
            ledger: Arc::new(InMemoryInitiationLedger::new()),
            queue: Arc::new(RecordingTaskQueue::new()),
            tasks: Arc::new(StaticTaskDetailApi::new()),
            handler: Arc::new(RecordingHandler::new()),
        }
    }

    /// Registers a tenant with `webhook_secret` and an optional
    /// automated-tasks category.
    pub async fn add_tenant(
        &self,
        tenant_id: &str,
        webhook_secret: &str,
        category_id: Option<&str>,
    ) {
        self.metadata
            .insert(DEFAULT_NAMESPACE, tenant_id, fixtures::tenant_metadata(tenant_id, category_id))
            .await;
        self.secrets.insert(&fixtures::api_key_ref(tenant_id), API_KEY).await;
        self.secrets.insert(&fixtures::webhook_secret_ref(tenant_id), webhook_secret).await;
    }

    /// Rotates a tenant's webhook secret.
    pub async fn rotate_secret(&self, tenant_id: &str, webhook_secret: &str) {
        self.secrets.insert(&fixtures::webhook_secret_ref(tenant_id), webhook_secret).await;
    }

    /// Resolver over the in-memory stores.
    pub fn resolver(&self) -> TenantResolver {
        TenantResolver::new(self.metadata.clone(), self.secrets.clone(), DEFAULT_NAMESPACE)
    }

    /// Verifier for the test provider.
    pub fn verifier(&self) -> WebhookVerifier {
        WebhookVerifier::new(self.resolver(), VerifierConfig::for_provider(PROVIDER))
    }

    /// Dispatcher submitting to the recording queue.
    pub fn dispatcher(&self) -> DurableDispatcher {
        DurableDispatcher::new(self.queue.clone(), DispatcherConfig {
            queue: QueueLocation {
                project: "test".to_string(),
                location: "us-central1".to_string(),
                queue: "webhook-processing".to_string(),
            },
            callback_url: CALLBACK_URL.to_string(),
        })
    }

    /// Processor with the recording handler behind every automation.
    pub fn processor(&self) -> AutomationProcessor {
        AutomationProcessor::new(
            HandlerRegistry::uniform(self.handler.clone()),
            self.tasks.clone(),
            self.ledger.clone(),
        )
    }
}
