//! Hands verified webhooks to the durable task queue.

use std::sync::Arc;

use bytes::Bytes;
use taskhook_core::VerifiedWebhook;
use tracing::{info, instrument, warn};

use crate::{
    error::{DispatchError, Result},
    payload::DispatchPayload,
    queue::{HttpTarget, QueueLocation, TaskHandle, TaskQueue},
};

/// Where dispatched webhooks go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Queue tasks are created in.
    pub queue: QueueLocation,
    /// Processing callback the queue delivers to.
    pub callback_url: String,
}

/// Serializes verified webhooks and submits them to a [`TaskQueue`].
///
/// Submission failures are returned to the caller; nothing is retried here.
#[derive(Debug, Clone)]
pub struct DurableDispatcher {
    queue: Arc<dyn TaskQueue>,
    config: DispatcherConfig,
    queue_path: String,
}

impl DurableDispatcher {
    /// Creates a dispatcher submitting to `queue`.
    pub fn new(queue: Arc<dyn TaskQueue>, config: DispatcherConfig) -> Self {
        let queue_path = config.queue.path();
        Self { queue, config, queue_path }
    }

    /// Target configuration in use.
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Enqueues `webhook` for processing by the callback.
    ///
    /// # Errors
    ///
    /// - `Configuration` if no callback URL is configured
    /// - `Serialization` if the payload cannot be encoded
    /// - any error from the task queue
    #[instrument(
        name = "enqueue_webhook",
        skip_all,
        fields(
            tenant_id = %webhook.tenant_id(),
            scheme = %webhook.scheme(),
            queue = %self.queue_path
        )
    )]
    pub async fn enqueue(&self, webhook: &VerifiedWebhook) -> Result<TaskHandle> {
        if self.config.callback_url.trim().is_empty() {
            return Err(DispatchError::configuration("callback URL is not configured"));
        }

        let payload = DispatchPayload::from_verified(webhook);
        let body = payload.to_json_vec().map_err(|e| DispatchError::serialization(e.to_string()))?;
        let target = HttpTarget::json(self.config.callback_url.clone());

        match self.queue.create_task(&self.queue_path, &target, Bytes::from(body)).await {
            Ok(handle) => {
                info!(task = %handle.name, "Webhook dispatched");
                Ok(handle)
            },
            Err(err) => {
                warn!(error = %err, retryable = err.is_retryable(), "Webhook dispatch failed");
                Err(err)
            },
        }
    }
}
